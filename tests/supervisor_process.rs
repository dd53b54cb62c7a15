// tests/supervisor_process.rs

//! ProcessSupervisor behaviour against real shell processes.

#![cfg(unix)]

mod common;

use common::{init_tracing, CollectingSink, TaskBuilder};

use std::time::{Duration, Instant};

use watchrun::clock::TokioClock;
use watchrun::exec::supervisor::{spawn, ExitResult};

#[tokio::test]
async fn stdout_and_stderr_are_merged_into_the_sink() {
    init_tracing();
    let sink = CollectingSink::new();
    let task = TaskBuilder::short("t")
        .script("echo out; echo err 1>&2")
        .build();

    let mut handle = spawn(&task, 1, sink.clone()).unwrap();
    assert_eq!(handle.wait().await, ExitResult::Ok);

    let output = sink.output_string("t");
    assert!(output.contains("out"), "stdout missing from sink: {output:?}");
    assert!(output.contains("err"), "stderr missing from sink: {output:?}");
}

#[tokio::test]
async fn output_records_carry_the_generation() {
    let sink = CollectingSink::new();
    let task = TaskBuilder::short("t").script("echo hello").build();

    let mut handle = spawn(&task, 7, sink.clone()).unwrap();
    assert_eq!(handle.wait().await, ExitResult::Ok);

    let output = sink.output.lock().unwrap();
    assert!(!output.is_empty());
    assert!(output.iter().all(|(_, generation, _)| *generation == 7));
}

#[tokio::test]
async fn nonzero_exit_is_reported_with_its_code() {
    let sink = CollectingSink::new();
    let task = TaskBuilder::short("t").script("exit 3").build();

    let mut handle = spawn(&task, 1, sink).unwrap();
    assert_eq!(handle.wait().await, ExitResult::NonZero(3));
}

#[tokio::test]
async fn env_is_applied_to_the_child() {
    let sink = CollectingSink::new();
    let task = TaskBuilder::short("t")
        .script("echo \"$GREETING\"")
        .env("GREETING", "hello from env")
        .build();

    let mut handle = spawn(&task, 1, sink.clone()).unwrap();
    assert_eq!(handle.wait().await, ExitResult::Ok);
    assert!(sink.output_string("t").contains("hello from env"));
}

#[tokio::test]
async fn terminate_soft_stops_a_cooperative_process() {
    let sink = CollectingSink::new();
    let task = TaskBuilder::short("t").script("sleep 30").build();

    let mut handle = spawn(&task, 1, sink).unwrap();
    let clock = TokioClock;

    let began = Instant::now();
    handle.terminate(&clock, Duration::from_secs(5)).await;
    assert!(
        began.elapsed() < Duration::from_secs(2),
        "soft stop took {:?}",
        began.elapsed()
    );
}

#[tokio::test]
async fn terminate_hard_kills_after_the_grace_period() {
    let sink = CollectingSink::new();
    // The shell ignores the soft stop and restarts its sleep children, so
    // only the hard kill ends it.
    let task = TaskBuilder::short("t")
        .script("trap '' TERM; while true; do sleep 1; done")
        .build();

    let mut handle = spawn(&task, 1, sink).unwrap();
    let clock = TokioClock;

    let began = Instant::now();
    handle.terminate(&clock, Duration::from_millis(300)).await;
    let elapsed = began.elapsed();
    assert!(elapsed >= Duration::from_millis(300), "killed early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "kill too slow: {elapsed:?}");
}

#[tokio::test]
async fn terminate_reaps_the_whole_process_group() {
    let sink = CollectingSink::new();
    // A background grandchild inherits the group; the group-wide signal must
    // reach it too, or terminate would hang on the output pumps.
    let task = TaskBuilder::short("t")
        .script("sleep 30 & sleep 30")
        .build();

    let mut handle = spawn(&task, 1, sink).unwrap();
    let clock = TokioClock;

    let began = Instant::now();
    handle.terminate(&clock, Duration::from_secs(5)).await;
    assert!(
        began.elapsed() < Duration::from_secs(3),
        "group terminate took {:?}",
        began.elapsed()
    );
}

#[tokio::test]
async fn missing_working_directory_fails_at_spawn() {
    let sink = CollectingSink::new();
    let task = TaskBuilder::short("t")
        .script("true")
        .dir("/definitely/not/a/real/directory")
        .build();

    assert!(spawn(&task, 1, sink).is_err());
}
