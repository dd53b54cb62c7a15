// tests/taskfile_loading.rs

//! Taskfile discovery, ID qualification, and validation.

mod common;

use common::{init_tracing, TaskBuilder};

use std::fs;
use std::path::Path;

use watchrun::config::{load, load_and_validate, validate};
use watchrun::errors::WatchrunError;
use watchrun::tasks::{TaskBody, Tasks};

fn write_taskfile(dir: &Path, contents: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("tasks.toml"), contents).unwrap();
}

#[test]
fn nested_taskfiles_qualify_ids_and_dirs() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();

    write_taskfile(
        root,
        r#"
        [[task]]
          id = "test"
          type = "short"
          cmd = "true"
          dependencies = ["child/test"]
          watch = ["file"]
        "#,
    );
    write_taskfile(
        &root.join("child"),
        r#"
        [[task]]
          id = "test"
          type = "short"
          cmd = "true"
          dependencies = ["grandchild/test"]
          watch = ["file"]
        "#,
    );
    write_taskfile(
        &root.join("child/grandchild"),
        r#"
        [[task]]
          id = "test"
          type = "short"
          cmd = "true"
        "#,
    );

    let tasks = load(root).unwrap();

    assert_eq!(
        tasks.ids(),
        ["test", "child/test", "child/grandchild/test"]
    );

    let child = tasks.get("child/test").unwrap();
    assert_eq!(child.dependencies, ["child/grandchild/test"]);
    assert_eq!(child.dir, root.join("child"));
    // Watch patterns stay relative to the declaring directory.
    assert_eq!(child.watch, ["file"]);

    let grandchild = tasks.get("child/grandchild/test").unwrap();
    assert_eq!(grandchild.dir, root.join("child/grandchild"));
    assert!(grandchild.dependencies.is_empty());

    validate(&tasks).unwrap();
}

#[test]
fn missing_root_taskfile_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let err = load(tmp.path()).unwrap_err();
    assert!(matches!(err, WatchrunError::Taskfile(_)));
}

#[test]
fn hidden_directories_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();

    write_taskfile(
        root,
        r#"
        [[task]]
          id = "build"
          type = "short"
          cmd = "true"
        "#,
    );
    write_taskfile(
        &root.join(".cache"),
        r#"
        [[task]]
          id = "stale"
          type = "short"
          cmd = "true"
        "#,
    );

    let tasks = load(root).unwrap();
    assert_eq!(tasks.ids(), ["build"]);
}

#[test]
fn task_type_is_mandatory_and_closed() {
    let tmp = tempfile::tempdir().unwrap();
    write_taskfile(
        tmp.path(),
        r#"
        [[task]]
          id = "weird"
          type = "forever"
          cmd = "true"
        "#,
    );
    assert!(matches!(
        load(tmp.path()).unwrap_err(),
        WatchrunError::Toml(_)
    ));

    write_taskfile(
        tmp.path(),
        r#"
        [[task]]
          id = "untyped"
          cmd = "true"
        "#,
    );
    assert!(matches!(
        load(tmp.path()).unwrap_err(),
        WatchrunError::Toml(_)
    ));
}

#[test]
fn empty_cmd_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    write_taskfile(
        tmp.path(),
        r#"
        [[task]]
          id = "hollow"
          type = "short"
          cmd = "  "
        "#,
    );
    assert!(matches!(
        load(tmp.path()).unwrap_err(),
        WatchrunError::Taskfile(_)
    ));
}

#[test]
fn env_and_description_are_carried_through() {
    let tmp = tempfile::tempdir().unwrap();
    write_taskfile(
        tmp.path(),
        r#"
        [[task]]
          id = "serve"
          description = "Run the dev server"
          type = "long"
          cmd = "server --port 8080"
          [task.env]
          PORT = "8080"
        "#,
    );

    let tasks = load_and_validate(tmp.path()).unwrap();
    let serve = tasks.get("serve").unwrap();
    assert_eq!(serve.description.as_deref(), Some("Run the dev server"));
    assert_eq!(serve.env.get("PORT").map(String::as_str), Some("8080"));
    assert!(matches!(&serve.body, TaskBody::Script(cmd) if cmd == "server --port 8080"));
}

#[test]
fn validation_collects_every_problem() {
    let tasks = Tasks::new(vec![
        TaskBuilder::short("a").dep("missing").build(),
        TaskBuilder::short("b").trigger("l").build(),
        TaskBuilder::long("l").build(),
        TaskBuilder::short("c").dep("d").build(),
        TaskBuilder::short("d").dep("c").build(),
    ]);

    let err = validate(&tasks).unwrap_err();
    let WatchrunError::Validation(problems) = err else {
        panic!("expected a validation error");
    };
    let text = problems.join("\n");
    assert!(text.contains("unknown task 'missing'"));
    assert!(text.contains("long task 'l' as a trigger"));
    assert!(text.contains("cycle detected"));
    assert!(problems.len() >= 3);
}

#[test]
fn duplicate_ids_are_rejected() {
    let tasks = Tasks::new(vec![
        TaskBuilder::short("twice").build(),
        TaskBuilder::short("twice").build(),
    ]);
    let err = validate(&tasks).unwrap_err();
    let WatchrunError::Validation(problems) = err else {
        panic!("expected a validation error");
    };
    assert!(problems[0].contains("declared more than once"));
}
