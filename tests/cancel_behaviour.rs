// tests/cancel_behaviour.rs

#![cfg(unix)]

use std::time::Duration;

use taskpoll::TaskParams;
use taskpoll::orchestrator::{CANCEL_REASON, Orchestrator};
use taskpoll::types::{ErrorKind, TaskState};
use taskpoll_test_utils::builders::{ConfigFileBuilder, TaskClassBuilder};
use taskpoll_test_utils::stub_worker::{SLEEPS, TWO_RECORDS, forks_child};
use taskpoll_test_utils::{init_tracing, process_alive, read_pid_file, wait_terminal, wait_until};

fn params() -> TaskParams {
    TaskParams::new(
        "2024-01-01".parse().unwrap(),
        "2024-06-01".parse().unwrap(),
    )
}

fn orchestrator() -> Orchestrator {
    ConfigFileBuilder::new()
        .with_class("slow", TaskClassBuilder::stub(SLEEPS).gate("python").build())
        .with_class("fast", TaskClassBuilder::stub(TWO_RECORDS).gate("python").build())
        .orchestrator()
}

#[tokio::test]
async fn cancelling_a_running_task_kills_its_worker() {
    init_tracing();
    let orchestrator = orchestrator();

    let id = orchestrator.submit("slow", params()).unwrap();
    let pid = orchestrator.worker_pid(&id).expect("worker pid recorded");
    assert!(process_alive(pid));
    assert_eq!(orchestrator.status(&id).state, TaskState::InProgress);

    assert!(orchestrator.cancel(&id));

    // Visible to pollers as soon as cancel returns.
    let status = orchestrator.status(&id);
    assert_eq!(status.state, TaskState::Cancelled);
    assert_eq!(status.error.as_deref(), Some(CANCEL_REASON));
    assert_eq!(status.error_kind, Some(ErrorKind::Cancelled));

    // Gate is released only once the worker is reaped.
    wait_until(|| !orchestrator.gate().is_held("python")).await;
    assert!(!process_alive(pid), "worker {pid} survived cancellation");
    assert_eq!(orchestrator.in_flight(), 0);

    // A late outcome does not overwrite the cancellation.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(orchestrator.status(&id).state, TaskState::Cancelled);
}

#[tokio::test]
async fn second_cancel_is_a_no_op() {
    init_tracing();
    let orchestrator = orchestrator();

    let id = orchestrator.submit("slow", params()).unwrap();
    assert!(orchestrator.cancel(&id));
    assert!(!orchestrator.cancel(&id));
    assert_eq!(orchestrator.status(&id).state, TaskState::Cancelled);
}

#[tokio::test]
async fn cancelling_unknown_or_finished_tasks_returns_false() {
    init_tracing();
    let orchestrator = orchestrator();

    assert!(!orchestrator.cancel(&taskpoll::TaskId::new()));

    let id = orchestrator.submit("fast", params()).unwrap();
    let status = wait_terminal(&orchestrator, &id).await;
    assert_eq!(status.state, TaskState::Completed);
    wait_until(|| orchestrator.in_flight() == 0).await;

    assert!(!orchestrator.cancel(&id));
    let after = orchestrator.status(&id);
    assert_eq!(after.state, TaskState::Completed);
    assert_eq!(after.result, status.result);
}

#[tokio::test]
async fn cancelling_a_rejected_task_returns_false() {
    init_tracing();
    let orchestrator = orchestrator();

    let running = orchestrator.submit("slow", params()).unwrap();
    let rejected = orchestrator
        .submit("fast", params())
        .unwrap_err()
        .task_id()
        .expect("conflict allocates a task id");

    assert!(!orchestrator.cancel(&rejected));
    assert_eq!(orchestrator.status(&rejected).state, TaskState::Failed);
    assert!(orchestrator.cancel(&running));
}

#[tokio::test]
async fn gate_is_reusable_after_cancellation() {
    init_tracing();
    let orchestrator = orchestrator();

    let id = orchestrator.submit("slow", params()).unwrap();
    assert!(orchestrator.cancel(&id));
    wait_until(|| !orchestrator.gate().is_held("python")).await;

    let next = orchestrator.submit("fast", params()).unwrap();
    assert_eq!(
        wait_terminal(&orchestrator, &next).await.state,
        TaskState::Completed
    );
}

#[tokio::test]
async fn cancel_and_timeout_leave_no_forked_processes() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cancelled_pid_file = dir.path().join("cancelled.pid");
    let timed_out_pid_file = dir.path().join("timed_out.pid");

    let orchestrator = ConfigFileBuilder::new()
        .with_class(
            "pool",
            TaskClassBuilder::stub(&forks_child(&cancelled_pid_file))
                .gate("pool")
                .build(),
        )
        .with_class(
            "pool_timeout",
            TaskClassBuilder::stub(&forks_child(&timed_out_pid_file))
                .gate("pool_timeout")
                .timeout(Duration::from_millis(300))
                .build(),
        )
        .orchestrator();

    let cancelled = orchestrator.submit("pool", params()).unwrap();
    let timed_out = orchestrator.submit("pool_timeout", params()).unwrap();

    let cancelled_child = read_pid_file(&cancelled_pid_file).await;
    assert!(orchestrator.cancel(&cancelled));

    let status = wait_terminal(&orchestrator, &timed_out).await;
    assert_eq!(status.error_kind, Some(ErrorKind::Timeout));
    let timed_out_child = read_pid_file(&timed_out_pid_file).await;

    wait_until(|| {
        !orchestrator.gate().is_held("pool") && !orchestrator.gate().is_held("pool_timeout")
    })
    .await;
    wait_until(|| !process_alive(cancelled_child) && !process_alive(timed_out_child)).await;
}
