#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing_subscriber::{fmt, EnvFilter};

use watchrun::engine::TaskEvent;
use watchrun::exec::EventSink;
use watchrun::tasks::{Task, TaskBody, TaskFn, TaskType};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Sink that forwards lifecycle events over a channel and discards output.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl EventSink for ChannelSink {
    fn event(&self, event: TaskEvent) {
        let _ = self.tx.send(event);
    }

    fn output(&self, _task: &str, _generation: u64, _chunk: &[u8]) {}
}

/// Sink that records everything, for asserting on task output bytes.
#[derive(Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<TaskEvent>>,
    pub output: Mutex<Vec<(String, u64, Vec<u8>)>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn output_string(&self, task: &str) -> String {
        let output = self.output.lock().unwrap();
        let bytes: Vec<u8> = output
            .iter()
            .filter(|(t, _, _)| t == task)
            .flat_map(|(_, _, chunk)| chunk.iter().copied())
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl EventSink for CollectingSink {
    fn event(&self, event: TaskEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn output(&self, task: &str, generation: u64, chunk: &[u8]) {
        self.output
            .lock()
            .unwrap()
            .push((task.to_string(), generation, chunk.to_vec()));
    }
}

/// Builder for tasks used in engine tests.
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn short(id: &str) -> Self {
        Self {
            task: Task {
                id: id.to_string(),
                description: None,
                kind: TaskType::Short,
                dependencies: Vec::new(),
                triggers: Vec::new(),
                watch: Vec::new(),
                dir: PathBuf::from("."),
                env: BTreeMap::new(),
                body: TaskBody::Func(TaskFn::new(|_| async { Ok(()) })),
            },
        }
    }

    pub fn long(id: &str) -> Self {
        let mut builder = Self::short(id);
        builder.task.kind = TaskType::Long;
        builder.task.body = TaskBody::Func(TaskFn::new(|token| async move {
            token.cancelled().await;
            Ok(())
        }));
        builder
    }

    pub fn dep(mut self, id: &str) -> Self {
        self.task.dependencies.push(id.to_string());
        self
    }

    pub fn trigger(mut self, id: &str) -> Self {
        self.task.triggers.push(id.to_string());
        self
    }

    pub fn watch(mut self, pattern: &str) -> Self {
        self.task.watch.push(pattern.to_string());
        self
    }

    pub fn dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.task.dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn script(mut self, cmd: &str) -> Self {
        self.task.body = TaskBody::Script(cmd.to_string());
        self
    }

    pub fn func(mut self, func: TaskFn) -> Self {
        self.task.body = TaskBody::Func(func);
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Next lifecycle event, bounded so a broken engine fails instead of
/// hanging.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<TaskEvent>) -> TaskEvent {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream closed")
}

/// Skip events until one matches the predicate.
pub async fn wait_for_event<F>(rx: &mut mpsc::UnboundedReceiver<TaskEvent>, mut pred: F) -> TaskEvent
where
    F: FnMut(&TaskEvent) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}
