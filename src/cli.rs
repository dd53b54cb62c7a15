// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `watchrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "watchrun",
    version,
    about = "Run and keep running a project's declared tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Task IDs to run, along with their dependencies and triggers.
    ///
    /// Defaults to the `dev` task when none are given.
    #[arg(value_name = "TASK")]
    pub tasks: Vec<String>,

    /// Directory containing the root tasks.toml.
    #[arg(long, value_name = "PATH", default_value = ".")]
    pub dir: String,

    /// List declared tasks and exit.
    #[arg(long)]
    pub list: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WATCHRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
