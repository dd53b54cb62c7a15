// src/config/validate.rs

//! Structural validation of a task set.
//!
//! The engine assumes a validated set: every referenced ID exists, the graph
//! of dependencies ∪ triggers is acyclic, and no long task is used as a
//! trigger source. All problems are collected and reported together, one per
//! line, rather than stopping at the first.

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, WatchrunError};
use crate::tasks::{TaskBody, TaskType, Tasks};

pub fn validate(tasks: &Tasks) -> Result<()> {
    let mut problems = Vec::new();

    check_duplicates(tasks, &mut problems);
    check_references(tasks, &mut problems);
    check_bodies(tasks, &mut problems);
    check_cycles(tasks, &mut problems);

    if problems.is_empty() {
        Ok(())
    } else {
        Err(WatchrunError::Validation(problems))
    }
}

fn check_duplicates(tasks: &Tasks, problems: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for id in tasks.ids() {
        if !seen.insert(id) {
            problems.push(format!("task '{}' is declared more than once", id));
        }
    }
}

fn check_references(tasks: &Tasks, problems: &mut Vec<String>) {
    for task in tasks.iter() {
        for dep in &task.dependencies {
            if !tasks.has(dep) {
                problems.push(format!(
                    "task '{}' depends on unknown task '{}'",
                    task.id, dep
                ));
            }
        }
        for trig in &task.triggers {
            match tasks.get(trig) {
                None => problems.push(format!(
                    "task '{}' is triggered by unknown task '{}'",
                    task.id, trig
                )),
                Some(source) if source.kind == TaskType::Long => problems.push(format!(
                    "task '{}' uses long task '{}' as a trigger; long tasks never complete",
                    task.id, trig
                )),
                Some(_) => {}
            }
        }
    }
}

fn check_bodies(tasks: &Tasks, problems: &mut Vec<String>) {
    for task in tasks.iter() {
        if let TaskBody::Script(cmd) = &task.body {
            if cmd.trim().is_empty() {
                problems.push(format!("task '{}' has an empty script body", task.id));
            }
        }
    }
}

fn check_cycles(tasks: &Tasks, problems: &mut Vec<String>) {
    // Edge direction: prerequisite -> dependent, over deps ∪ triggers.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in tasks.ids() {
        graph.add_node(id.as_str());
    }
    for task in tasks.iter() {
        for pre in task.dependencies.iter().chain(task.triggers.iter()) {
            if tasks.has(pre) {
                graph.add_edge(pre.as_str(), task.id.as_str(), ());
            }
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        problems.push(format!(
            "cycle detected in dependencies/triggers involving task '{}'",
            cycle.node_id()
        ));
    }
}
