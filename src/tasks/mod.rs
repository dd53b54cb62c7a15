// src/tasks/mod.rs

//! Task metadata and the immutable task set consumed by the engine.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Canonical task identifier. Path-qualified with `/` separators; top-level
/// tasks carry no prefix.
pub type TaskId = String;

/// How a task is managed by its runner.
///
/// - `Short` tasks run to completion. A zero exit emits a completion signal;
///   a non-zero exit is retried after a fixed delay.
/// - `Long` tasks are expected to run indefinitely and are restarted on any
///   exit. A long task is never a valid trigger source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Short,
    Long,
}

/// Future produced by an in-process task body.
pub type BodyFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// In-process task body: an async function taking a cancellation token.
///
/// The token is cancelled when the runner terminates the current generation;
/// well-behaved bodies observe it and return promptly.
#[derive(Clone)]
pub struct TaskFn(Arc<dyn Fn(CancellationToken) -> BodyFuture + Send + Sync>);

impl TaskFn {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |token| Box::pin(f(token))))
    }

    pub(crate) fn call(&self, token: CancellationToken) -> BodyFuture {
        (self.0)(token)
    }
}

impl fmt::Debug for TaskFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskFn(..)")
    }
}

/// The work a task performs, opaque to everything but the supervisor.
#[derive(Debug, Clone)]
pub enum TaskBody {
    /// Shell script, run under a POSIX shell (`cmd /C` on Windows) with the
    /// task's `dir` as working directory.
    Script(String),
    /// In-process async function.
    Func(TaskFn),
}

/// A user-declared unit of work.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub description: Option<String>,
    pub kind: TaskType,
    /// Task IDs that must have completed (short) or been running for the
    /// grace period (long) before this task first starts.
    pub dependencies: Vec<TaskId>,
    /// Task IDs whose successful completion requests a rerun of this task.
    pub triggers: Vec<TaskId>,
    /// Glob patterns, resolved relative to `dir`, whose changes restart this
    /// task.
    pub watch: Vec<String>,
    /// Working directory for the body and root for `watch` patterns. This is
    /// the directory of the taskfile that declared the task.
    pub dir: PathBuf,
    /// Extra environment variables applied at spawn.
    pub env: BTreeMap<String, String>,
    pub body: TaskBody,
}

/// Immutable, ordered collection of [`Task`]s.
///
/// Iteration order is declaration order. Construction does not validate;
/// run [`crate::config::validate`] before handing a set to the engine, which
/// relies on its guarantees (no dangling IDs, no cycles under
/// dependencies ∪ triggers, no long task used as a trigger).
#[derive(Debug, Clone, Default)]
pub struct Tasks {
    ids: Vec<TaskId>,
    tasks: HashMap<TaskId, Arc<Task>>,
}

impl Tasks {
    pub fn new(tasks: Vec<Task>) -> Self {
        let mut set = Tasks {
            ids: Vec::with_capacity(tasks.len()),
            tasks: HashMap::with_capacity(tasks.len()),
        };
        for task in tasks {
            set.ids.push(task.id.clone());
            set.tasks.insert(task.id.clone(), Arc::new(task));
        }
        set
    }

    /// Task IDs in canonical (declaration) order.
    pub fn ids(&self) -> &[TaskId] {
        &self.ids
    }

    pub fn has(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Task>> {
        self.tasks.get(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Tasks in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.ids.iter().filter_map(|id| self.tasks.get(id))
    }
}
