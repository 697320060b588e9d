//! Integration tests for coordinated shutdown.
//!
//! These tests validate that:
//! - Shutdown cancels running job bodies and waits for them to return
//! - A body that ignores cancellation past the deadline yields ShutdownTimeout
//! - After shutdown no new jobs are accepted and queued jobs are discarded


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use prio_sched::error::SchedulerError;
use prio_sched::scheduler::{JobDraft, JobOutcome};
use test_harness::{
    assert_eventually, blocking_job, busy_count, stubborn_job, test_scheduler, wait_dispatched,
    wait_finished,
};

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_shutdown_cancels_cooperative_jobs() {
    let scheduler = test_scheduler(2);
    let mut events = scheduler.subscribe();

    scheduler
        .submit(JobDraft::sleeping("long-1", 10, Duration::from_secs(30)))
        .await
        .unwrap();
    scheduler
        .submit(JobDraft::sleeping("long-2", 20, Duration::from_secs(30)))
        .await
        .unwrap();
    assert_eventually(
        || async { busy_count(&scheduler).await == 2 },
        WAIT,
        "both jobs should be running",
    )
    .await;

    let started = Instant::now();
    scheduler.shutdown(WAIT).await.unwrap();
    assert!(started.elapsed() < WAIT);

    let mut outcomes = vec![
        wait_finished(&mut events, "long-1", WAIT).await,
        wait_finished(&mut events, "long-2", WAIT).await,
    ];
    outcomes.dedup();
    assert_eq!(outcomes, vec![JobOutcome::Cancelled]);
}

/// One worker running a 10s job that ignores cancellation; a 50ms deadline
/// times out, and the job's token was still cancelled.
#[tokio::test]
async fn test_shutdown_times_out_on_stubborn_job() {
    let scheduler = test_scheduler(1);
    let mut events = scheduler.subscribe();
    let saw_cancel = Arc::new(AtomicBool::new(false));

    scheduler
        .submit(stubborn_job(
            "X",
            50,
            Duration::from_secs(10),
            saw_cancel.clone(),
        ))
        .await
        .unwrap();
    wait_dispatched(&mut events, "X", WAIT).await;

    let result = scheduler.shutdown(Duration::from_millis(50)).await;
    assert!(matches!(
        result,
        Err(SchedulerError::ShutdownTimeout(d)) if d == Duration::from_millis(50)
    ));

    assert_eventually(
        || async { saw_cancel.load(Ordering::SeqCst) },
        WAIT,
        "job should observe cancellation",
    )
    .await;
    assert!(scheduler.is_shutting_down());

    // forced stop of the stuck worker
    tokio::time::timeout(WAIT, scheduler.abort())
        .await
        .expect("abort should finish promptly");
}

/// A second, shorter shutdown is bounded by its own deadline, not by the
/// call already waiting.
#[tokio::test]
async fn test_concurrent_shutdown_honors_its_own_deadline() {
    let scheduler = Arc::new(test_scheduler(1));
    let mut events = scheduler.subscribe();

    scheduler
        .submit(stubborn_job(
            "slow",
            50,
            Duration::from_millis(500),
            Arc::new(AtomicBool::new(false)),
        ))
        .await
        .unwrap();
    wait_dispatched(&mut events, "slow", WAIT).await;

    let first = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.shutdown(Duration::from_secs(3)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    let second = scheduler.shutdown(Duration::from_millis(50)).await;
    assert!(matches!(
        second,
        Err(SchedulerError::ShutdownTimeout(d)) if d == Duration::from_millis(50)
    ));
    assert!(started.elapsed() < Duration::from_millis(400));

    // the longer call still sees the job finish
    first.await.unwrap().unwrap();
    assert!(scheduler.status().await.iter().all(|s| !s.busy));
}

#[tokio::test]
async fn test_zero_deadline_with_stubborn_job_times_out() {
    let scheduler = test_scheduler(1);
    let mut events = scheduler.subscribe();

    scheduler
        .submit(stubborn_job(
            "stuck",
            50,
            Duration::from_secs(10),
            Arc::new(AtomicBool::new(false)),
        ))
        .await
        .unwrap();
    wait_dispatched(&mut events, "stuck", WAIT).await;

    let result = scheduler.shutdown(Duration::ZERO).await;
    assert!(matches!(result, Err(SchedulerError::ShutdownTimeout(_))));

    scheduler.abort().await;
}

/// A deadline longer than the remaining work completes cleanly even if the
/// job ignores cancellation.
#[tokio::test]
async fn test_shutdown_waits_for_job_within_deadline() {
    let scheduler = test_scheduler(1);
    let mut events = scheduler.subscribe();

    scheduler
        .submit(stubborn_job(
            "short",
            50,
            Duration::from_millis(100),
            Arc::new(AtomicBool::new(false)),
        ))
        .await
        .unwrap();
    wait_dispatched(&mut events, "short", WAIT).await;

    scheduler.shutdown(WAIT).await.unwrap();
    assert_eq!(
        wait_finished(&mut events, "short", WAIT).await,
        JobOutcome::Cancelled
    );
    assert!(scheduler.status().await.iter().all(|s| !s.busy));
}

#[tokio::test]
async fn test_shutdown_rejects_new_jobs_and_discards_queue() {
    let scheduler = test_scheduler(1);
    let mut events = scheduler.subscribe();

    scheduler.submit(blocking_job("running", 50)).await.unwrap();
    wait_dispatched(&mut events, "running", WAIT).await;
    scheduler.submit(blocking_job("waiting", 10)).await.unwrap();
    assert_eq!(scheduler.queued_len().await, 1);

    scheduler.shutdown(WAIT).await.unwrap();

    assert!(scheduler.queued_jobs().await.is_empty());
    let err = scheduler
        .submit(blocking_job("late", 10))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ShuttingDown));
}

#[tokio::test]
async fn test_shutdown_twice_is_ok() {
    let scheduler = test_scheduler(2);
    scheduler.shutdown(WAIT).await.unwrap();
    scheduler.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_shutdown_idle_scheduler() {
    let scheduler = test_scheduler(4);
    let started = Instant::now();
    scheduler.shutdown(WAIT).await.unwrap();
    assert!(started.elapsed() < WAIT);
    assert!(scheduler.is_drained().await);
}
