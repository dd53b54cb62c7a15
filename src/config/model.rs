// src/config/model.rs

//! Raw TOML shape of a single taskfile.
//!
//! A taskfile is an array of tasks:
//!
//! ```toml
//! [[task]]
//!   id = "dev"
//!   type = "long"
//!   cmd = "npm start"
//!   dependencies = ["build"]
//!
//! [[task]]
//!   id = "build"
//!   type = "short"
//!   cmd = "npm run build"
//!   watch = ["src/**/*.js"]
//! ```
//!
//! IDs declared here are local to the taskfile; the loader qualifies them
//! with the file's directory prefix.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::tasks::TaskType;

/// One parsed taskfile, prior to ID qualification.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTaskfile {
    #[serde(default)]
    pub task: Vec<RawTask>,
}

/// A single `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTask {
    pub id: String,

    #[serde(default)]
    pub description: Option<String>,

    /// `"short"` or `"long"`. There is no default: every task must say which
    /// it is, and any other value fails deserialization.
    #[serde(rename = "type")]
    pub kind: TaskType,

    /// The shell command to execute.
    pub cmd: String,

    /// Task IDs that must run before this one. References to tasks in child
    /// directories are written relative to this file (e.g. `"css/build"`).
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Task IDs whose success reruns this task.
    #[serde(default)]
    pub triggers: Vec<String>,

    /// Glob patterns, relative to this file's directory, whose changes
    /// restart the task.
    #[serde(default)]
    pub watch: Vec<String>,

    /// Extra environment variables for the command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
