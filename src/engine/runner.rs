// src/engine/runner.rs

//! Per-task state machine.
//!
//! One `TaskRunner` supervises one task for the life of the orchestration:
//!
//! ```text
//! idle ──deps satisfied──► starting ──spawned──► running
//!
//! running (short), exit 0   → emit succeeded, notify trigger subscribers,
//!                             then idle (or straight back to starting when
//!                             a rerun is pending)
//! running (short), exit ≠ 0 → emit failed, backoff, restart
//! running (long),  any exit → backoff, restart
//! running, rerun request    → emit restarting, terminate, reap, restart
//! backoff, rerun request    → pending_rerun = true (collapses into the
//!                             restart the backoff timer will do anyway)
//! any, shutdown             → terminate current generation, stopped
//! ```
//!
//! Rules:
//! - At most one body is in flight per task; a generation is fully reaped
//!   before its successor is spawned.
//! - The generation counter increments on every (re)start and annotates
//!   every event and output record, so stale records are identifiable.
//! - Bursts of rerun requests collapse into a single restart.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::engine::{
    EventKind, Phase, RerunReason, RunnerMsg, RunnerStatus, TaskEvent, LONG_DEP_GRACE, RETRY_DELAY,
    TERMINATE_GRACE,
};
use crate::exec::sink::EventSink;
use crate::exec::supervisor::{self, ExecHandle, ExitResult};
use crate::tasks::{Task, TaskId, TaskType};

/// One dependency edge, observed over the dependency's status channel.
pub struct DepWatch {
    pub id: TaskId,
    pub kind: TaskType,
    pub status: watch::Receiver<RunnerStatus>,
}

/// Everything a runner needs, wired up by the orchestrator (or directly by
/// tests).
pub struct RunnerWiring {
    pub task: Arc<Task>,
    pub clock: Arc<dyn Clock>,
    pub sink: Arc<dyn EventSink>,
    pub shutdown: CancellationToken,
    pub msg_rx: mpsc::Receiver<RunnerMsg>,
    pub deps: Vec<DepWatch>,
    /// Command channels of tasks that list this task among their triggers.
    pub subscribers: Vec<mpsc::Sender<RunnerMsg>>,
    pub status_tx: watch::Sender<RunnerStatus>,
}

/// What the state machine does next.
enum Step {
    Start,
    Idle,
    Backoff,
    Stop,
}

enum Gate {
    Ready,
    Never,
    Shutdown,
}

pub struct TaskRunner {
    task: Arc<Task>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    shutdown: CancellationToken,
    msg_rx: mpsc::Receiver<RunnerMsg>,
    deps: Vec<DepWatch>,
    subscribers: Vec<mpsc::Sender<RunnerMsg>>,
    status_tx: watch::Sender<RunnerStatus>,
    status: RunnerStatus,
    generation: u64,
    pending_rerun: bool,
}

impl TaskRunner {
    pub fn new(wiring: RunnerWiring) -> Self {
        Self {
            task: wiring.task,
            clock: wiring.clock,
            sink: wiring.sink,
            shutdown: wiring.shutdown,
            msg_rx: wiring.msg_rx,
            deps: wiring.deps,
            subscribers: wiring.subscribers,
            status_tx: wiring.status_tx,
            status: RunnerStatus::default(),
            generation: 0,
            pending_rerun: false,
        }
    }

    /// Run until shutdown. Always reaches the stopped state before
    /// returning.
    pub async fn run(mut self) {
        debug!(task = %self.task.id, "runner started");

        let gate = tokio::select! {
            res = wait_for_deps(&self.clock, &mut self.deps) => match res {
                Ok(()) => Gate::Ready,
                Err(()) => Gate::Never,
            },
            _ = self.shutdown.cancelled() => Gate::Shutdown,
        };

        match gate {
            Gate::Ready => {
                // A trigger source's first success both opens the gate and
                // queues a rerun request; the request is the start we are
                // about to do.
                self.drain_rerun_requests();
                let mut next = Step::Start;
                loop {
                    next = match next {
                        Step::Start => self.start_generation().await,
                        Step::Idle => self.idle().await,
                        Step::Backoff => self.backoff().await,
                        Step::Stop => break,
                    };
                }
            }
            Gate::Never => {
                // A dependency's runner went away without ever satisfying the
                // predicate; hold in idle until shutdown.
                self.shutdown.cancelled().await;
            }
            Gate::Shutdown => {}
        }

        self.set_phase(Phase::Stopped);
        self.emit(EventKind::Stopped);
        debug!(task = %self.task.id, "runner stopped");
    }

    async fn start_generation(&mut self) -> Step {
        self.generation += 1;
        self.set_phase(Phase::Starting);
        debug!(task = %self.task.id, generation = self.generation, "spawning body");

        let mut handle = match supervisor::spawn(&self.task, self.generation, Arc::clone(&self.sink))
        {
            Ok(handle) => handle,
            Err(err) => {
                warn!(task = %self.task.id, error = %err, "failed to spawn task body");
                self.set_phase(Phase::ExitedErr);
                self.emit(EventKind::Failed(-1));
                return Step::Backoff;
            }
        };

        self.set_phase(Phase::Running);
        self.emit(EventKind::Started);
        self.supervise(&mut handle).await
    }

    /// Drive one generation to its end: natural exit, rerun-triggered
    /// termination, or shutdown.
    async fn supervise(&mut self, handle: &mut ExecHandle) -> Step {
        tokio::select! {
            exit = handle.wait() => self.on_exit(exit),
            msg = self.msg_rx.recv() => match msg {
                Some(RunnerMsg::Rerun(reason)) => {
                    if reason == RerunReason::FileChange {
                        self.emit(EventKind::FileChanged);
                    }
                    self.emit(EventKind::Restarting);
                    handle.terminate(&*self.clock, TERMINATE_GRACE).await;
                    // Requests that piled up while terminating collapse into
                    // this one restart.
                    self.drain_rerun_requests();
                    Step::Start
                }
                None => {
                    self.set_phase(Phase::Stopping);
                    handle.terminate(&*self.clock, TERMINATE_GRACE).await;
                    Step::Stop
                }
            },
            _ = self.shutdown.cancelled() => {
                self.set_phase(Phase::Stopping);
                handle.terminate(&*self.clock, TERMINATE_GRACE).await;
                Step::Stop
            }
        }
    }

    fn on_exit(&mut self, exit: ExitResult) -> Step {
        match self.task.kind {
            TaskType::Short => match exit {
                ExitResult::Ok => {
                    // Emit and notify before the status-watch update so that
                    // a dependent released by this success can never reach
                    // the sink first, and so a waiting subscriber finds its
                    // rerun request already queued when its gate opens.
                    self.emit(EventKind::Succeeded);
                    self.notify_subscribers();
                    self.set_phase(Phase::ExitedOk);
                    if self.pending_rerun {
                        self.pending_rerun = false;
                        Step::Start
                    } else {
                        Step::Idle
                    }
                }
                ExitResult::NonZero(code) => {
                    self.set_phase(Phase::ExitedErr);
                    self.emit(EventKind::Failed(code));
                    Step::Backoff
                }
                ExitResult::Signaled(signal) => {
                    warn!(task = %self.task.id, signal = %signal, "task killed by signal");
                    self.set_phase(Phase::ExitedErr);
                    self.emit(EventKind::Failed(-1));
                    Step::Backoff
                }
                ExitResult::Cancelled => {
                    // Terminations initiated here return their own next step,
                    // so a cancellation surfacing through `wait` is a body
                    // that observed a stray cancel. Retry it.
                    self.set_phase(Phase::ExitedErr);
                    self.emit(EventKind::Failed(-1));
                    Step::Backoff
                }
            },
            // Long tasks never complete: any exit is followed by a restart.
            TaskType::Long => {
                match exit {
                    ExitResult::Ok => {
                        self.set_phase(Phase::ExitedOk);
                    }
                    ExitResult::NonZero(code) => {
                        self.set_phase(Phase::ExitedErr);
                        self.emit(EventKind::Failed(code));
                    }
                    ExitResult::Signaled(_) | ExitResult::Cancelled => {
                        self.set_phase(Phase::ExitedErr);
                        self.emit(EventKind::Failed(-1));
                    }
                }
                Step::Backoff
            }
        }
    }

    async fn idle(&mut self) -> Step {
        self.set_phase(Phase::Idle);
        tokio::select! {
            msg = self.msg_rx.recv() => match msg {
                Some(RunnerMsg::Rerun(reason)) => {
                    if reason == RerunReason::FileChange {
                        self.emit(EventKind::FileChanged);
                    }
                    Step::Start
                }
                None => Step::Stop,
            },
            _ = self.shutdown.cancelled() => Step::Stop,
        }
    }

    async fn backoff(&mut self) -> Step {
        self.set_phase(Phase::Backoff);
        self.emit(EventKind::Backoff(RETRY_DELAY));

        let sleep = self.clock.sleep(RETRY_DELAY);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => {
                    self.pending_rerun = false;
                    return Step::Start;
                }
                msg = self.msg_rx.recv() => match msg {
                    Some(RunnerMsg::Rerun(reason)) => {
                        if reason == RerunReason::FileChange {
                            self.emit(EventKind::FileChanged);
                        }
                        // Collapses into the restart the timer will do.
                        self.pending_rerun = true;
                    }
                    None => return Step::Stop,
                },
                // Pending work does not survive shutdown.
                _ = self.shutdown.cancelled() => return Step::Stop,
            }
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        self.status.phase = phase;
        if phase == Phase::Running {
            self.status.ever_started = true;
        }
        if phase == Phase::ExitedOk && self.task.kind == TaskType::Short {
            self.status.ever_succeeded = true;
        }
        self.status_tx.send_replace(self.status);
    }

    fn emit(&self, kind: EventKind) {
        self.sink.event(TaskEvent {
            task: self.task.id.clone(),
            generation: self.generation,
            kind,
        });
    }

    fn notify_subscribers(&self) {
        for subscriber in &self.subscribers {
            // A full channel means a rerun is already queued there; dropping
            // the extra request is the collapse the contract asks for.
            let _ = subscriber.try_send(RunnerMsg::Rerun(RerunReason::Trigger));
        }
    }

    fn drain_rerun_requests(&mut self) {
        let mut drained = 0usize;
        while self.msg_rx.try_recv().is_ok() {
            drained += 1;
        }
        if drained > 0 {
            debug!(task = %self.task.id, drained, "collapsed queued rerun requests");
        }
    }
}

/// Block until every dependency predicate holds:
/// - a short dependency (or trigger source, which gates the first start the
///   same way) must have succeeded at least once;
/// - a long dependency must have started, plus the fixed grace period.
///
/// Errors when a dependency's status channel closes before the predicate is
/// ever satisfied.
async fn wait_for_deps(clock: &Arc<dyn Clock>, deps: &mut [DepWatch]) -> Result<(), ()> {
    for dep in deps.iter_mut() {
        match dep.kind {
            TaskType::Short => {
                dep.status
                    .wait_for(|status| status.ever_succeeded)
                    .await
                    .map_err(|_| ())?;
            }
            TaskType::Long => {
                dep.status
                    .wait_for(|status| status.ever_started)
                    .await
                    .map_err(|_| ())?;
                clock.sleep(LONG_DEP_GRACE).await;
            }
        }
    }
    Ok(())
}
