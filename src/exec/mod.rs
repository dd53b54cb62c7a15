// src/exec/mod.rs

//! Process supervision and output sinks.
//!
//! - [`supervisor`] starts task bodies (shell scripts or in-process
//!   functions), streams their output, and terminates them with a grace
//!   period.
//! - [`sink`] is where lifecycle events and task output bytes go.

pub mod sink;
pub mod supervisor;

pub use sink::{ConsoleSink, EventSink};
pub use supervisor::{ExecHandle, ExitResult};
