// src/config/loader.rs

//! Discovery and loading of nested taskfiles.
//!
//! `load` reads the taskfile in the root directory plus every taskfile found
//! in (non-hidden) subdirectories. Tasks declared in a nested file get their
//! ID, dependency references and trigger references prefixed with the file's
//! `/`-separated path, so `build` declared in `./css/tasks.toml` becomes
//! `css/build` everywhere. Watch patterns are *not* prefixed: they resolve
//! against the task's own directory at watch time.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawTask, RawTaskfile};
use crate::config::validate::validate;
use crate::errors::{Result, WatchrunError};
use crate::tasks::{Task, TaskBody, TaskId, Tasks};

/// Name of the declaration file looked for in each directory.
pub const TASKFILE_NAME: &str = "tasks.toml";

/// Load every taskfile under `root` into a [`Tasks`] set.
///
/// This performs TOML deserialization and ID qualification only; it does
/// **not** check graph-level invariants. Use [`load_and_validate`] for that.
pub fn load(root: impl AsRef<Path>) -> Result<Tasks> {
    let root = root.as_ref();

    if !root.join(TASKFILE_NAME).is_file() {
        return Err(WatchrunError::Taskfile(format!(
            "no {} found in {}",
            TASKFILE_NAME,
            root.display()
        )));
    }

    let mut all = Vec::new();
    for rel_dir in discover_taskfile_dirs(root)? {
        let dir = root.join(&rel_dir);
        let path = dir.join(TASKFILE_NAME);
        let prefix = id_prefix(&rel_dir);

        debug!(path = %path.display(), prefix = %prefix, "loading taskfile");

        let contents = fs::read_to_string(&path)?;
        let raw: RawTaskfile = toml::from_str(&contents)?;

        for task in raw.task {
            all.push(qualify_task(task, &prefix, &dir)?);
        }
    }

    Ok(Tasks::new(all))
}

/// Load and validate: the recommended entry point for the CLI.
pub fn load_and_validate(root: impl AsRef<Path>) -> Result<Tasks> {
    let tasks = load(root)?;
    validate(&tasks)?;
    Ok(tasks)
}

/// Directories (relative to `root`, root itself first) that contain a
/// taskfile. Traversal is depth-first with sorted entries so declaration
/// order is stable across platforms; hidden directories are skipped.
fn discover_taskfile_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![PathBuf::new()];

    while let Some(rel) = stack.pop() {
        let dir = root.join(&rel);
        if dir.join(TASKFILE_NAME).is_file() {
            found.push(rel.clone());
        }

        let mut children = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type()?.is_dir() {
                children.push(rel.join(name.as_ref()));
            }
        }
        // Reversed so the stack pops them in lexicographic order.
        children.sort();
        children.reverse();
        stack.extend(children);
    }

    Ok(found)
}

/// `/`-separated ID prefix for a taskfile directory ("" for the root).
fn id_prefix(rel_dir: &Path) -> String {
    let parts: Vec<&str> = rel_dir
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    parts.join("/")
}

fn qualify_task(raw: RawTask, prefix: &str, dir: &Path) -> Result<Task> {
    let id = qualify(prefix, &raw.id);

    if raw.cmd.trim().is_empty() {
        return Err(WatchrunError::Taskfile(format!(
            "task '{}' has an empty cmd",
            id
        )));
    }

    Ok(Task {
        id,
        description: raw.description,
        kind: raw.kind,
        dependencies: raw
            .dependencies
            .iter()
            .map(|dep| qualify(prefix, dep))
            .collect(),
        triggers: raw
            .triggers
            .iter()
            .map(|trig| qualify(prefix, trig))
            .collect(),
        watch: raw.watch,
        dir: dir.to_path_buf(),
        env: raw.env,
        body: TaskBody::Script(raw.cmd),
    })
}

fn qualify(prefix: &str, id: &str) -> TaskId {
    if prefix.is_empty() {
        id.to_string()
    } else {
        format!("{prefix}/{id}")
    }
}
