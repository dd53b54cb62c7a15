// src/errors.rs

//! Crate-wide error type and Result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchrunError {
    #[error("Taskfile error: {0}")]
    Taskfile(String),

    #[error("invalid task set:\n{}", .0.join("\n"))]
    Validation(Vec<String>),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("watch setup failed: {0}")]
    WatchSetup(String),

    #[error("file watching lost: {0}")]
    WatchLost(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WatchrunError>;
