// src/engine/orchestrator.rs

//! Owns the task graph at runtime.
//!
//! Startup: compute the transitive closure of the requested roots under
//! dependencies ∪ triggers, topologically order it by dependencies (spawn
//! order only; runtime progression is event-driven), materialize one runner
//! per task, wire the edges into channels, register file watches, and let
//! the runners go. Shutdown: cancel the root, wait for every runner to reach
//! its stopped state, then return.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::engine::runner::{DepWatch, RunnerWiring, TaskRunner};
use crate::engine::{RerunReason, RunnerMsg, RunnerStatus};
use crate::errors::{Result, WatchrunError};
use crate::exec::sink::EventSink;
use crate::tasks::{TaskId, Tasks};
use crate::watch::FileWatcher;

/// Runs a task set: one runner per selected task, wired per the declared
/// dependency and trigger edges, under a single cancellation root.
pub struct Orchestrator {
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl Orchestrator {
    pub fn new(clock: Arc<dyn Clock>, sink: Arc<dyn EventSink>) -> Self {
        Self { clock, sink }
    }

    /// Execute `root_ids` plus everything reachable from them over
    /// dependencies ∪ triggers, until `shutdown` is cancelled or the watch
    /// facility is lost.
    ///
    /// Cancellation is a clean exit and yields `Ok(())`. By the time this
    /// returns, every runner has stopped and every child process is reaped.
    pub async fn run(
        &self,
        tasks: &Tasks,
        root_ids: &[TaskId],
        shutdown: CancellationToken,
    ) -> Result<()> {
        for id in root_ids {
            if !tasks.has(id) {
                return Err(WatchrunError::UnknownTask(id.clone()));
            }
        }

        let active = transitive_closure(tasks, root_ids);
        let order = spawn_order(tasks, &active)?;
        info!(roots = ?root_ids, tasks = order.len(), "orchestration starting");

        // Child of the caller's token, so internal fatal errors can initiate
        // shutdown without cancelling the caller's context.
        let stop = shutdown.child_token();

        let mut msg_txs: HashMap<TaskId, mpsc::Sender<RunnerMsg>> = HashMap::new();
        let mut msg_rxs: HashMap<TaskId, mpsc::Receiver<RunnerMsg>> = HashMap::new();
        let mut status_rxs: HashMap<TaskId, watch::Receiver<RunnerStatus>> = HashMap::new();
        let mut status_txs: HashMap<TaskId, watch::Sender<RunnerStatus>> = HashMap::new();
        for id in &order {
            let (msg_tx, msg_rx) = mpsc::channel(16);
            let (status_tx, status_rx) = watch::channel(RunnerStatus::default());
            msg_txs.insert(id.clone(), msg_tx);
            msg_rxs.insert(id.clone(), msg_rx);
            status_txs.insert(id.clone(), status_tx);
            status_rxs.insert(id.clone(), status_rx);
        }

        // File watching, only when some active task asks for it. Setup
        // errors here are fatal before anything runs.
        let mut watcher = None;
        let mut watch_events = None;
        let mut watch_fatal = None;
        if order
            .iter()
            .any(|id| !tasks.get(id).expect("active id").watch.is_empty())
        {
            let mut fw = FileWatcher::new(Arc::clone(&self.clock), stop.clone())?;
            for id in &order {
                let task = tasks.get(id).expect("active id");
                if !task.watch.is_empty() {
                    fw.register(id, &task.dir, &task.watch)?;
                }
            }
            watch_events = Some(fw.events());
            watch_fatal = Some(fw.fatal());
            watcher = Some(fw);
        }

        // Route debounced file events to the owning runner.
        if let Some(mut events) = watch_events {
            let routes = msg_txs.clone();
            let token = stop.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        event = events.recv() => match event {
                            Some(task) => {
                                if let Some(tx) = routes.get(&task) {
                                    // Full queue: a rerun is already pending.
                                    let _ = tx.try_send(RunnerMsg::Rerun(RerunReason::FileChange));
                                }
                            }
                            None => break,
                        },
                        _ = token.cancelled() => break,
                    }
                }
            });
        }

        // Spawn runners, dependencies before dependents.
        let mut runners = JoinSet::new();
        for id in &order {
            let task = Arc::clone(tasks.get(id).expect("active id"));

            // Trigger sources gate the first start the same way short
            // dependencies do: a task does not run before the tasks that
            // feed it have completed once.
            let deps = task
                .dependencies
                .iter()
                .chain(task.triggers.iter())
                .map(|dep| DepWatch {
                    id: dep.clone(),
                    kind: tasks.get(dep).expect("validated dep").kind,
                    status: status_rxs.get(dep).expect("active dep").clone(),
                })
                .collect();

            // Tasks listing `id` among their triggers rerun when it
            // succeeds.
            let subscribers = order
                .iter()
                .filter(|candidate| {
                    tasks
                        .get(candidate.as_str())
                        .expect("active id")
                        .triggers
                        .iter()
                        .any(|trigger| trigger == id)
                })
                .map(|candidate| msg_txs.get(candidate).expect("active id").clone())
                .collect();

            let wiring = RunnerWiring {
                task,
                clock: Arc::clone(&self.clock),
                sink: Arc::clone(&self.sink),
                shutdown: stop.clone(),
                msg_rx: msg_rxs.remove(id).expect("unspawned id"),
                deps,
                subscribers,
                status_tx: status_txs.remove(id).expect("unspawned id"),
            };
            runners.spawn(TaskRunner::new(wiring).run());
        }

        // Wait for shutdown or a fatal watcher failure.
        let mut fatal: Option<WatchrunError> = None;
        let fatal_wait = async {
            match watch_fatal.as_mut() {
                Some(rx) => rx.recv().await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = stop.cancelled() => {}
            failure = fatal_wait => {
                if let Some(message) = failure {
                    warn!(error = %message, "fatal watch failure; shutting down");
                    fatal = Some(WatchrunError::WatchLost(message));
                }
                stop.cancel();
            }
        }

        // Every runner reaches stopped before we return.
        while let Some(joined) = runners.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "runner task panicked");
            }
        }
        drop(watcher);
        drop(msg_txs);

        info!("orchestration stopped");
        match fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// All tasks reachable from the roots over dependencies ∪ triggers, in
/// canonical (declaration) order.
fn transitive_closure(tasks: &Tasks, root_ids: &[TaskId]) -> HashSet<TaskId> {
    let mut seen: HashSet<TaskId> = HashSet::new();
    let mut queue: VecDeque<TaskId> = root_ids.iter().cloned().collect();

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(task) = tasks.get(&id) {
            for next in task.dependencies.iter().chain(task.triggers.iter()) {
                if !seen.contains(next) {
                    queue.push_back(next.clone());
                }
            }
        }
    }

    seen
}

/// Topological order of the active set by dependency edges only, so each
/// runner is spawned after the runners it depends on.
fn spawn_order(tasks: &Tasks, active: &HashSet<TaskId>) -> Result<Vec<TaskId>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in tasks.ids() {
        if active.contains(id) {
            graph.add_node(id.as_str());
        }
    }
    for id in tasks.ids() {
        if !active.contains(id) {
            continue;
        }
        let task = tasks.get(id).expect("known id");
        for dep in &task.dependencies {
            if active.contains(dep) {
                graph.add_edge(dep.as_str(), id.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|id| id.to_string()).collect()),
        // The validator rejects cycles before the engine runs.
        Err(cycle) => Err(WatchrunError::Validation(vec![format!(
            "cycle detected in dependencies involving task '{}'",
            cycle.node_id()
        )])),
    }
}
