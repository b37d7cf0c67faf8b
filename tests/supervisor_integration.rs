//! End-to-end supervisor tests with real child processes.
//!
//! Workers are small shell scripts written into a tempdir with unique
//! file names, so the launch-time name sweep cannot touch anything
//! outside the test.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use corekeeper::events::CoreEvent;
use corekeeper::paths::BaseDirResolver;
use corekeeper::supervisor::{
    CoreSupervisor, LaunchError, LaunchOptions, StopError, StopOutcome,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Write an executable worker script with a unique name.
fn write_worker(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path.to_string_lossy().into_owned()
}

fn make_supervisor(dir: &Path) -> (CoreSupervisor, UnboundedReceiver<CoreEvent>) {
    let (tx, rx) = unbounded_channel();
    (CoreSupervisor::new(BaseDirResolver::new(dir), tx), rx)
}

async fn next_event(rx: &mut UnboundedReceiver<CoreEvent>) -> CoreEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Drain events until the terminal notification, returning everything
/// received including it.
async fn collect_until_stopped(rx: &mut UnboundedReceiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = matches!(event, CoreEvent::Stopped { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

#[tokio::test]
async fn second_launch_rejected_while_running() {
    let dir = TempDir::new().unwrap();
    let exe = write_worker(dir.path(), "ck-dbl.sh", "exec sleep 5");
    let (supervisor, mut rx) = make_supervisor(dir.path());

    let pid = supervisor
        .launch(&exe, &[], &LaunchOptions::new())
        .await
        .unwrap();

    let second = supervisor.launch(&exe, &[], &LaunchOptions::new()).await;
    assert!(matches!(second, Err(LaunchError::AlreadyRunning)));
    // Original worker untouched.
    assert_eq!(supervisor.pid().await, Some(pid));

    assert_eq!(supervisor.stop().await.unwrap(), StopOutcome::Stopped);
    collect_until_stopped(&mut rx).await;
}

#[tokio::test]
async fn stop_without_worker_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (supervisor, _rx) = make_supervisor(dir.path());

    assert_eq!(supervisor.stop().await.unwrap(), StopOutcome::NotRunning);
    assert_eq!(supervisor.stop().await.unwrap(), StopOutcome::NotRunning);
}

#[tokio::test]
async fn pid_marker_lifecycle() {
    let dir = TempDir::new().unwrap();
    let exe = write_worker(dir.path(), "ck-marker.sh", "exec sleep 1");
    let (supervisor, mut rx) = make_supervisor(dir.path());
    let options = LaunchOptions::new().pid_file("core.pid");

    let pid = supervisor.launch(&exe, &[], &options).await.unwrap();

    let marker = dir.path().join("core.pid");
    assert!(marker.exists());
    assert_eq!(
        std::fs::read_to_string(&marker).unwrap().trim(),
        pid.to_string()
    );

    collect_until_stopped(&mut rx).await;
    assert!(!marker.exists());
    assert!(!supervisor.is_running().await);
}

#[tokio::test]
async fn rapid_lines_arrive_ordered_in_bounded_batches() {
    let dir = TempDir::new().unwrap();
    let exe = write_worker(dir.path(), "ck-batch.sh", "seq 1 120");
    let (supervisor, mut rx) = make_supervisor(dir.path());

    supervisor
        .launch(&exe, &[], &LaunchOptions::new())
        .await
        .unwrap();

    let events = collect_until_stopped(&mut rx).await;
    let mut lines: Vec<u32> = Vec::new();
    for event in &events {
        if let CoreEvent::LogBatch(batch) = event {
            let batch_lines: Vec<&str> = batch.split('\n').collect();
            assert!(batch_lines.len() <= 50, "batch exceeded 50 lines");
            lines.extend(batch_lines.iter().map(|l| l.parse::<u32>().unwrap()));
        }
    }
    let expected: Vec<u32> = (1..=120).collect();
    assert_eq!(lines, expected);
}

#[tokio::test]
async fn slow_worker_line_arrives_via_periodic_flush() {
    let dir = TempDir::new().unwrap();
    let exe = write_worker(dir.path(), "ck-slow.sh", "echo first\nexec sleep 2");
    let (supervisor, mut rx) = make_supervisor(dir.path());

    supervisor
        .launch(&exe, &[], &LaunchOptions::new())
        .await
        .unwrap();

    // The line must be flushed by the 200 ms ticker, not at exit.
    let event = tokio::time::timeout(Duration::from_millis(1500), rx.recv())
        .await
        .expect("line not flushed before worker exit")
        .unwrap();
    assert_eq!(event, CoreEvent::LogBatch("first".to_string()));

    collect_until_stopped(&mut rx).await;
}

#[tokio::test]
async fn ready_keyword_fires_once_before_terminal_event() {
    let dir = TempDir::new().unwrap();
    let exe = write_worker(
        dir.path(),
        "ck-ready.sh",
        "echo booting\necho 'system READY'\necho 'system READY again'",
    );
    let (supervisor, mut rx) = make_supervisor(dir.path());
    let options = LaunchOptions::new().ready_keyword("READY");

    supervisor.launch(&exe, &[], &options).await.unwrap();

    let events = collect_until_stopped(&mut rx).await;
    let ready_positions: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, CoreEvent::Ready))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(ready_positions.len(), 1, "ready must fire exactly once");
    assert!(ready_positions[0] < events.len() - 1, "ready must precede terminal event");
}

#[tokio::test]
async fn stale_pid_marker_is_recovered() {
    let dir = TempDir::new().unwrap();
    let exe = write_worker(dir.path(), "ck-stale.sh", "exec sleep 1");

    // Marker from a "previous session" pointing at a dead pid.
    let marker = dir.path().join("core.pid");
    std::fs::write(&marker, "4000000000").unwrap();

    let (supervisor, mut rx) = make_supervisor(dir.path());
    let options = LaunchOptions::new().pid_file("core.pid");

    let pid = supervisor.launch(&exe, &[], &options).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(&marker).unwrap().trim(),
        pid.to_string()
    );

    collect_until_stopped(&mut rx).await;
    assert!(!marker.exists());
}

#[tokio::test]
async fn abnormal_exit_reported_in_terminal_event() {
    let dir = TempDir::new().unwrap();
    let exe = write_worker(dir.path(), "ck-fail.sh", "echo dying\nexit 3");
    let (supervisor, mut rx) = make_supervisor(dir.path());

    supervisor
        .launch(&exe, &[], &LaunchOptions::new())
        .await
        .unwrap();

    let events = collect_until_stopped(&mut rx).await;
    match events.last() {
        Some(CoreEvent::Stopped { error: Some(msg) }) => {
            assert!(msg.contains('3'), "exit status missing from {msg}");
        }
        other => panic!("expected error terminal event, got {other:?}"),
    }
}

#[tokio::test]
async fn log_file_mirrors_output() {
    let dir = TempDir::new().unwrap();
    let exe = write_worker(dir.path(), "ck-log.sh", "echo alpha\necho beta");
    let (supervisor, mut rx) = make_supervisor(dir.path());
    let options = LaunchOptions::new().log_file("logs/core.log");

    supervisor.launch(&exe, &[], &options).await.unwrap();
    collect_until_stopped(&mut rx).await;

    let content = std::fs::read_to_string(dir.path().join("logs/core.log")).unwrap();
    assert_eq!(content, "alpha\nbeta\n");
}

#[tokio::test]
async fn env_overrides_reach_the_worker() {
    let dir = TempDir::new().unwrap();
    let exe = write_worker(dir.path(), "ck-env.sh", "echo \"value=$CK_TEST_VAR\"");
    let (supervisor, mut rx) = make_supervisor(dir.path());
    let options = LaunchOptions::new().env("CK_TEST_VAR", "injected");

    supervisor.launch(&exe, &[], &options).await.unwrap();

    let events = collect_until_stopped(&mut rx).await;
    let saw_value = events.iter().any(|e| {
        matches!(e, CoreEvent::LogBatch(batch) if batch.contains("value=injected"))
    });
    assert!(saw_value);
}

#[tokio::test]
async fn stderr_is_part_of_the_combined_stream() {
    let dir = TempDir::new().unwrap();
    let exe = write_worker(dir.path(), "ck-err.sh", "echo to-stderr 1>&2");
    let (supervisor, mut rx) = make_supervisor(dir.path());

    supervisor
        .launch(&exe, &[], &LaunchOptions::new())
        .await
        .unwrap();

    let events = collect_until_stopped(&mut rx).await;
    let saw_stderr = events
        .iter()
        .any(|e| matches!(e, CoreEvent::LogBatch(batch) if batch.contains("to-stderr")));
    assert!(saw_stderr);
}

#[tokio::test]
async fn stop_times_out_on_sigterm_ignoring_worker() {
    let dir = TempDir::new().unwrap();
    // Ignores SIGTERM; loops with short-lived children so the output
    // pipe is released quickly once the shell itself is killed.
    let exe = write_worker(
        dir.path(),
        "ck-stub.sh",
        "trap '' TERM\necho armed\nwhile :; do sleep 1; done",
    );
    let (supervisor, mut rx) = make_supervisor(dir.path());

    let pid = supervisor
        .launch(&exe, &[], &LaunchOptions::new())
        .await
        .unwrap();

    // Wait until the trap is installed before asking for a stop.
    loop {
        if let CoreEvent::LogBatch(batch) = next_event(&mut rx).await {
            if batch.contains("armed") {
                break;
            }
        }
    }

    let result = supervisor.stop().await;
    assert!(matches!(result, Err(StopError::Timeout(_))));

    // The worker is nonetheless cleaned up once it actually dies.
    corekeeper::platform::force_kill(pid);
    let events = collect_until_stopped(&mut rx).await;
    assert!(matches!(events.last(), Some(CoreEvent::Stopped { .. })));
    assert!(!supervisor.is_running().await);
}
