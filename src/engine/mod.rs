// src/engine/mod.rs

//! Task graph execution engine.
//!
//! The [`orchestrator`] turns a validated task set into a live execution:
//! one [`runner::TaskRunner`] per selected task, each a self-contained
//! message-driven state machine supervising its own body. Cross-runner
//! coupling is exclusively through channels wired at startup:
//!
//! - dependency edges are observed over `tokio::sync::watch` status
//!   channels;
//! - trigger edges and file changes arrive as rerun requests on a per-runner
//!   `mpsc` command channel;
//! - shutdown fans out from a single cancellation root.

use std::time::Duration;

pub mod orchestrator;
pub mod runner;

pub use orchestrator::Orchestrator;
pub use runner::{DepWatch, RunnerWiring, TaskRunner};

use crate::tasks::TaskId;

/// Grace period before a consumer of a long dependency treats it as ready.
/// Long tasks never signal completion, so downstream tasks wait this long
/// after the dependency starts. A documented approximation, not configurable.
pub const LONG_DEP_GRACE: Duration = Duration::from_millis(500);

/// Delay before rerunning a failed short task, and before restarting an
/// exited long task. Fixed: no exponential backoff and no retry cap, on the
/// assumption that a developer is watching and will fix or cancel.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// How long a terminated body gets between the soft stop signal and the
/// hard kill.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle event kinds surfaced to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Started,
    Succeeded,
    Failed(i32),
    Restarting,
    FileChanged,
    Backoff(Duration),
    Stopped,
}

/// A lifecycle event, annotated with the generation it belongs to so
/// consumers can discard stale records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub task: TaskId,
    pub generation: u64,
    pub kind: EventKind,
}

/// Why a rerun was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerunReason {
    /// A trigger source completed successfully.
    Trigger,
    /// A watched file changed.
    FileChange,
}

/// Message delivered to a runner's command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerMsg {
    Rerun(RerunReason),
}

/// Phase of a runner's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Starting,
    Running,
    ExitedOk,
    ExitedErr,
    Backoff,
    Stopping,
    Stopped,
}

/// Snapshot published on a runner's status channel, observed by dependents.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerStatus {
    pub phase: Phase,
    /// Reached `Running` at least once in this orchestration.
    pub ever_started: bool,
    /// Reached `ExitedOk` at least once (short tasks only).
    pub ever_succeeded: bool,
}
