// src/exec/sink.rs

//! Output sink abstraction.
//!
//! The engine annotates everything it emits with the task ID and generation,
//! and leaves multiplexing to the sink. Both methods must be safe to call
//! concurrently; each call is one atomic record.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::engine::{EventKind, TaskEvent};
use crate::tasks::TaskId;

/// Consumer of lifecycle events and task output.
pub trait EventSink: Send + Sync {
    /// Record a lifecycle event.
    fn event(&self, event: TaskEvent);

    /// Record a chunk of merged stdout/stderr output. Chunks arrive in order
    /// within a generation; generations never interleave.
    fn output(&self, task: &str, generation: u64, chunk: &[u8]);
}

/// Sink used by the CLI: task output lines to stdout prefixed with the task
/// ID, lifecycle events to the log (stderr).
pub struct ConsoleSink {
    buffers: Mutex<HashMap<TaskId, Vec<u8>>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for ConsoleSink {
    fn event(&self, event: TaskEvent) {
        match event.kind {
            EventKind::Started => {
                info!(task = %event.task, generation = event.generation, "started")
            }
            EventKind::Succeeded => {
                info!(task = %event.task, generation = event.generation, "succeeded")
            }
            EventKind::Failed(code) => {
                warn!(task = %event.task, generation = event.generation, code, "failed")
            }
            EventKind::Restarting => {
                info!(task = %event.task, generation = event.generation, "restarting")
            }
            EventKind::FileChanged => {
                info!(task = %event.task, "watched file changed")
            }
            EventKind::Backoff(delay) => {
                info!(task = %event.task, delay_ms = delay.as_millis() as u64, "backing off")
            }
            EventKind::Stopped => {
                info!(task = %event.task, "stopped")
            }
        }
    }

    fn output(&self, task: &str, _generation: u64, chunk: &[u8]) {
        let mut buffers = self.buffers.lock().unwrap();
        let buffer = buffers.entry(task.to_string()).or_default();
        buffer.extend_from_slice(chunk);

        // Print only complete lines; the remainder waits for the next chunk.
        let stdout = std::io::stdout();
        let mut stdout = stdout.lock();
        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            let _ = write!(stdout, "{task} | ");
            let _ = stdout.write_all(&line);
        }
    }
}
