// src/lib.rs

pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod signals;
pub mod tasks;
pub mod watch;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::CliArgs;
use crate::clock::TokioClock;
use crate::engine::Orchestrator;
use crate::errors::{Result, WatchrunError};
use crate::exec::ConsoleSink;
use crate::tasks::{TaskId, Tasks};

pub use crate::engine::{EventKind, TaskEvent};
pub use crate::errors::WatchrunError as Error;
pub use crate::tasks::{Task, TaskBody, TaskFn, TaskType};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - taskfile discovery + validation
/// - the orchestrator (runners, watcher, supervisor)
/// - signal handling → root cancellation
pub async fn run(args: CliArgs) -> Result<()> {
    let tasks = config::load_and_validate(&args.dir)?;

    if args.list {
        print_task_list(&tasks);
        return Ok(());
    }

    let roots = resolve_roots(&tasks, &args.tasks)?;

    // OS signals → root cancellation. The engine itself never touches
    // process-wide signal state.
    let shutdown = CancellationToken::new();
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = signals::wait_for_shutdown_signal().await {
                eprintln!("watchrun: failed to listen for shutdown signals: {err}");
                return;
            }
            info!("shutdown signal received");
            token.cancel();
        });
    }

    let clock = Arc::new(TokioClock);
    let sink = Arc::new(ConsoleSink::new());
    let orchestrator = Orchestrator::new(clock, sink);
    orchestrator.run(&tasks, &roots, shutdown).await
}

/// Root tasks to execute: the ones named on the command line, or the
/// conventional `dev` task when none were given.
fn resolve_roots(tasks: &Tasks, requested: &[String]) -> Result<Vec<TaskId>> {
    if !requested.is_empty() {
        for id in requested {
            if !tasks.has(id) {
                return Err(WatchrunError::UnknownTask(id.clone()));
            }
        }
        return Ok(requested.to_vec());
    }

    if tasks.has("dev") {
        return Ok(vec!["dev".to_string()]);
    }

    Err(WatchrunError::Taskfile(format!(
        "no task given and no 'dev' task declared; available tasks: {}",
        tasks.ids().join(", ")
    )))
}

fn print_task_list(tasks: &Tasks) {
    for task in tasks.iter() {
        let kind = match task.kind {
            TaskType::Short => "short",
            TaskType::Long => "long",
        };
        match &task.description {
            Some(description) => {
                println!("{:<28} [{}]", task.id, kind);
                for line in description.lines() {
                    println!("    {line}");
                }
            }
            None => println!("{:<28} [{}]", task.id, kind),
        }
    }
}
