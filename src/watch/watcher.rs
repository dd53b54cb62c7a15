// src/watch/watcher.rs

//! Notify-backed file watcher with per-task registrations.
//!
//! One `RecommendedWatcher` serves every task: each registration records the
//! task's directory (watched recursively) plus its compiled patterns, and a
//! router task maps raw notify events to task IDs before they pass through
//! the debouncer.
//!
//! Failure semantics:
//! - Registration errors are fatal and surface to the orchestrator.
//! - Mid-run OS errors that carry paths are logged; if a watch root was
//!   removed, re-registration is attempted once an event for its parent
//!   arrives and the directory exists again.
//! - OS errors with no associated path mean the watch facility itself is
//!   gone, which is fatal.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::errors::{Result, WatchrunError};
use crate::tasks::TaskId;
use crate::watch::debounce::spawn_debouncer;
use crate::watch::patterns::WatchPatterns;

/// One task's watch registration.
struct Registration {
    task: TaskId,
    root: PathBuf,
    patterns: WatchPatterns,
}

enum RawEvent {
    Fs(Event),
    Error(notify::Error),
}

/// File watcher handle. Dropping it stops file watching.
pub struct FileWatcher {
    watcher: Arc<Mutex<RecommendedWatcher>>,
    registrations: Arc<Mutex<Vec<Registration>>>,
    watched_roots: HashSet<PathBuf>,
    events_rx: Option<mpsc::Receiver<TaskId>>,
    fatal_rx: Option<mpsc::Receiver<String>>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("watched_roots", &self.watched_roots)
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Create the watcher and start its router and debouncer loops.
    pub fn new(clock: Arc<dyn Clock>, token: CancellationToken) -> Result<Self> {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel::<RawEvent>();
        let (hit_tx, hit_rx) = mpsc::unbounded_channel::<TaskId>();
        let (out_tx, out_rx) = mpsc::channel::<TaskId>(64);
        let (fatal_tx, fatal_rx) = mpsc::channel::<String>(1);

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let raw = match res {
                    Ok(event) => RawEvent::Fs(event),
                    Err(err) => RawEvent::Error(err),
                };
                // A closed channel means the router is gone and we are
                // shutting down.
                let _ = notify_tx.send(raw);
            },
            Config::default(),
        )
        .map_err(|err| WatchrunError::WatchSetup(err.to_string()))?;

        let watcher = Arc::new(Mutex::new(watcher));
        let registrations = Arc::new(Mutex::new(Vec::new()));

        spawn_router(
            notify_rx,
            hit_tx,
            fatal_tx,
            Arc::clone(&watcher),
            Arc::clone(&registrations),
            token.clone(),
        );
        spawn_debouncer(clock, hit_rx, out_tx, token);

        Ok(Self {
            watcher,
            registrations,
            watched_roots: HashSet::new(),
            events_rx: Some(out_rx),
            fatal_rx: Some(fatal_rx),
        })
    }

    /// Register a task's watch patterns, rooted at `dir`.
    ///
    /// Setup errors here are fatal: a bad glob, a missing directory, or a
    /// wildcard-free pattern naming a path that does not exist.
    pub fn register(&mut self, task: &str, dir: &Path, globs: &[String]) -> Result<()> {
        let patterns = WatchPatterns::compile(globs)?;

        let root = dir.canonicalize().map_err(|err| {
            WatchrunError::WatchSetup(format!(
                "watch root {} for task '{}': {}",
                dir.display(),
                task,
                err
            ))
        })?;

        for literal in patterns.literals() {
            if !root.join(literal).exists() {
                return Err(WatchrunError::WatchSetup(format!(
                    "task '{}' watches '{}', which does not exist",
                    task, literal
                )));
            }
        }

        if self.watched_roots.insert(root.clone()) {
            self.watcher
                .lock()
                .unwrap()
                .watch(&root, RecursiveMode::Recursive)
                .map_err(|err| {
                    WatchrunError::WatchSetup(format!(
                        "watching {} for task '{}': {}",
                        root.display(),
                        task,
                        err
                    ))
                })?;
            info!(task = %task, root = %root.display(), "watch root registered");
        }

        self.registrations.lock().unwrap().push(Registration {
            task: task.to_string(),
            root,
            patterns,
        });
        Ok(())
    }

    /// Debounced stream of task IDs whose watched files changed. Can be
    /// taken once.
    pub fn events(&mut self) -> mpsc::Receiver<TaskId> {
        self.events_rx.take().expect("events receiver already taken")
    }

    /// Fatal watcher failures (loss of the OS watch facility). Can be taken
    /// once.
    pub fn fatal(&mut self) -> mpsc::Receiver<String> {
        self.fatal_rx.take().expect("fatal receiver already taken")
    }
}

fn spawn_router(
    mut notify_rx: mpsc::UnboundedReceiver<RawEvent>,
    hit_tx: mpsc::UnboundedSender<TaskId>,
    fatal_tx: mpsc::Sender<String>,
    watcher: Arc<Mutex<RecommendedWatcher>>,
    registrations: Arc<Mutex<Vec<Registration>>>,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        let mut lost_roots: HashSet<PathBuf> = HashSet::new();

        loop {
            let raw = tokio::select! {
                raw = notify_rx.recv() => match raw {
                    Some(raw) => raw,
                    None => break,
                },
                _ = token.cancelled() => break,
            };

            match raw {
                RawEvent::Fs(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        continue;
                    }
                    debug!(?event, "notify event");

                    rewatch_lost_roots(&watcher, &mut lost_roots);

                    let registrations = registrations.lock().unwrap();
                    for path in &event.paths {
                        for reg in registrations.iter() {
                            if let Some(rel) = relative_to(path, &reg.root) {
                                if reg.patterns.matches(&rel) {
                                    let _ = hit_tx.send(reg.task.clone());
                                }
                            }
                        }
                    }
                }
                RawEvent::Error(err) => {
                    if err.paths.is_empty() {
                        warn!(error = %err, "file watch facility failed");
                        let _ = fatal_tx.send(err.to_string()).await;
                        break;
                    }
                    // Path-scoped errors are survivable; a removed watch root
                    // is re-registered when its parent sees activity again.
                    warn!(error = %err, paths = ?err.paths, "file watch error; continuing");
                    for path in &err.paths {
                        if registrations
                            .lock()
                            .unwrap()
                            .iter()
                            .any(|reg| reg.root == *path)
                        {
                            lost_roots.insert(path.clone());
                        }
                    }
                }
            }
        }
        debug!("watch router finished");
    });
}

fn rewatch_lost_roots(watcher: &Arc<Mutex<RecommendedWatcher>>, lost_roots: &mut HashSet<PathBuf>) {
    if lost_roots.is_empty() {
        return;
    }
    lost_roots.retain(|root| {
        if !root.exists() {
            return true;
        }
        match watcher
            .lock()
            .unwrap()
            .watch(root, RecursiveMode::Recursive)
        {
            Ok(()) => {
                info!(root = %root.display(), "re-registered lost watch root");
                false
            }
            Err(err) => {
                debug!(root = %root.display(), error = %err, "re-registration failed; will retry");
                true
            }
        }
    });
}

/// `/`-separated path of `path` relative to `root`, or `None` if `path` is
/// outside `root` (or is the root itself).
fn relative_to(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(rel.to_string_lossy().replace('\\', "/"))
}
