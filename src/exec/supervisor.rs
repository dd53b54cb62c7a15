// src/exec/supervisor.rs

//! Task body supervision.
//!
//! [`spawn`] starts a task's body and returns an [`ExecHandle`] owned by
//! exactly one runner generation. Shell scripts run under `sh -c` (`cmd /C`
//! on Windows) with the task's directory as working directory; on Unix the
//! child gets its own process group so termination signals reach the whole
//! group. In-process function bodies run as a spawned future with a
//! cancellation token.
//!
//! stdout and stderr are merged into the sink in arrival order; one read is
//! one sink call, so chunks are never split across writes.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::errors::Result;
use crate::exec::sink::EventSink;
use crate::tasks::{Task, TaskBody, TaskId};

/// How a supervised body finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitResult {
    /// Exited with status zero (or the function returned `Ok`).
    Ok,
    /// Exited with a non-zero status code.
    NonZero(i32),
    /// Killed by a signal.
    Signaled(String),
    /// Terminated by the supervisor.
    Cancelled,
}

enum HandleKind {
    Process {
        child: Child,
        /// Process group ID on Unix; `None` elsewhere or when the child is
        /// already gone.
        pgid: Option<i32>,
        pumps: Vec<JoinHandle<()>>,
    },
    Func {
        token: CancellationToken,
        handle: JoinHandle<anyhow::Result<()>>,
    },
}

/// A running task body, owned by one runner generation.
pub struct ExecHandle {
    task: TaskId,
    generation: u64,
    kind: HandleKind,
}

/// Start the given task's body.
///
/// Spawn failures (missing shell, unresolvable working directory) surface as
/// errors here; the runner reports them and retries per policy.
pub fn spawn(task: &Task, generation: u64, sink: Arc<dyn EventSink>) -> Result<ExecHandle> {
    let kind = match &task.body {
        TaskBody::Script(script) => spawn_script(task, script, generation, sink)?,
        TaskBody::Func(func) => {
            let token = CancellationToken::new();
            let handle = tokio::spawn(func.call(token.clone()));
            HandleKind::Func { token, handle }
        }
    };

    Ok(ExecHandle {
        task: task.id.clone(),
        generation,
        kind,
    })
}

fn spawn_script(
    task: &Task,
    script: &str,
    generation: u64,
    sink: Arc<dyn EventSink>,
) -> Result<HandleKind> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(script);
        c
    };

    cmd.current_dir(&task.dir)
        .envs(&task.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;

    #[cfg(unix)]
    let pgid = child.id().map(|pid| pid as i32);
    #[cfg(not(unix))]
    let pgid = None;

    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(spawn_pump(
            stdout,
            Arc::clone(&sink),
            task.id.clone(),
            generation,
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(spawn_pump(stderr, sink, task.id.clone(), generation));
    }

    Ok(HandleKind::Process { child, pgid, pumps })
}

impl ExecHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the body to finish on its own. The generation's output is
    /// fully flushed before this returns.
    pub async fn wait(&mut self) -> ExitResult {
        match &mut self.kind {
            HandleKind::Process { child, pumps, .. } => {
                let status = match child.wait().await {
                    Ok(status) => status,
                    Err(err) => {
                        warn!(task = %self.task, error = %err, "waiting on child failed");
                        join_pumps(pumps).await;
                        return ExitResult::NonZero(-1);
                    }
                };
                join_pumps(pumps).await;
                exit_result_from_status(status)
            }
            HandleKind::Func { token, handle } => {
                let result = (&mut *handle).await;
                if token.is_cancelled() {
                    return ExitResult::Cancelled;
                }
                match result {
                    Ok(Ok(())) => ExitResult::Ok,
                    Ok(Err(err)) => {
                        debug!(task = %self.task, error = %err, "task function returned an error");
                        ExitResult::NonZero(1)
                    }
                    Err(join_err) if join_err.is_cancelled() => ExitResult::Cancelled,
                    Err(join_err) => {
                        warn!(task = %self.task, error = %join_err, "task function panicked");
                        ExitResult::NonZero(-1)
                    }
                }
            }
        }
    }

    /// Terminate the body: soft stop first, hard kill once `grace` elapses.
    /// Returns only when the body is fully reaped.
    pub async fn terminate(&mut self, clock: &dyn Clock, grace: Duration) {
        match &mut self.kind {
            HandleKind::Process { child, pgid, pumps } => {
                soft_stop(child, *pgid);

                let exited = tokio::select! {
                    _ = child.wait() => true,
                    _ = clock.sleep(grace) => false,
                };
                if !exited {
                    debug!(task = %self.task, "grace period elapsed; killing process group");
                    hard_kill(child, *pgid);
                    let _ = child.wait().await;
                }
                join_pumps(pumps).await;
            }
            HandleKind::Func { token, handle } => {
                token.cancel();
                let finished = tokio::select! {
                    _ = &mut *handle => true,
                    _ = clock.sleep(grace) => false,
                };
                if !finished {
                    debug!(task = %self.task, "task function ignored cancellation; aborting");
                    handle.abort();
                    let _ = (&mut *handle).await;
                }
            }
        }
    }
}

/// Ask the process (group) to stop. On platforms without process groups this
/// is already the hard kill.
fn soft_stop(child: &mut Child, pgid: Option<i32>) {
    #[cfg(unix)]
    {
        if let Some(pgid) = pgid {
            unsafe {
                libc::kill(-pgid, libc::SIGTERM);
            }
            return;
        }
    }
    let _ = pgid;
    let _ = child.start_kill();
}

fn hard_kill(child: &mut Child, pgid: Option<i32>) {
    #[cfg(unix)]
    {
        if let Some(pgid) = pgid {
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
    let _ = pgid;
    let _ = child.start_kill();
}

async fn join_pumps(pumps: &mut Vec<JoinHandle<()>>) {
    for pump in pumps.drain(..) {
        // Bounded: a grandchild holding the pipe open must not wedge the
        // runner.
        if tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .is_err()
        {
            debug!("output pump did not finish in time; detaching");
        }
    }
}

fn exit_result_from_status(status: std::process::ExitStatus) -> ExitResult {
    if status.success() {
        return ExitResult::Ok;
    }
    if let Some(code) = status.code() {
        return ExitResult::NonZero(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitResult::Signaled(signal_name(signal));
        }
    }
    ExitResult::NonZero(-1)
}

fn spawn_pump<R>(
    mut reader: R,
    sink: Arc<dyn EventSink>,
    task: TaskId,
    generation: u64,
) -> JoinHandle<()>
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => sink.output(&task, generation, &buf[..n]),
                Err(err) => {
                    debug!(task = %task, error = %err, "output pump read failed");
                    break;
                }
            }
        }
    })
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    match signal {
        libc::SIGHUP => "SIGHUP".to_string(),
        libc::SIGINT => "SIGINT".to_string(),
        libc::SIGQUIT => "SIGQUIT".to_string(),
        libc::SIGKILL => "SIGKILL".to_string(),
        libc::SIGSEGV => "SIGSEGV".to_string(),
        libc::SIGTERM => "SIGTERM".to_string(),
        other => format!("signal {other}"),
    }
}
