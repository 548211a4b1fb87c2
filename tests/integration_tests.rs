//! End-to-end scenarios driven through the queue and a live scheduler loop.


use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fleetrun::error::Error;
use fleetrun::scheduler::job::JobStatus;
use fleetrun::scheduler::RESTART_RESET_ERROR;
use fleetrun::worker::TestOutcome;
use test_harness::{assert_eventually, request, ScriptedExecutor, TestOrchestrator};

#[tokio::test]
async fn test_happy_path_to_completion() {
    let orch = TestOrchestrator::new();
    let token = orch.spawn_scheduler();

    let id = orch.submit(request("acme", "v1", "a.spec")).await;
    assert_eq!(orch.job(&id).await.status, JobStatus::Queued);

    let queue = orch.queue.clone();
    let done_id = id.clone();
    assert_eventually(
        || {
            let queue = queue.clone();
            let id = done_id.clone();
            async move { queue.get(&id).await.unwrap().status == JobStatus::Completed }
        },
        Duration::from_secs(2),
        "job should complete within a couple of ticks",
    )
    .await;
    token.cancel();

    let job = orch.job(&id).await;
    assert_eq!(job.progress, 100);
    assert!(job.result.as_deref().is_some_and(|r| !r.is_empty()));
    assert_eq!(job.agent_id.as_deref(), Some("agent-1"));
    assert_eq!(job.device_id.as_deref(), Some("emulator-1"));
    assert!(job.started_at.unwrap() <= job.completed_at.unwrap());
}

#[tokio::test]
async fn test_duplicate_submission_while_scheduler_runs() {
    let orch = TestOrchestrator::with_executor(
        ScriptedExecutor::passing().with_latency(Duration::from_millis(300)),
    );
    let token = orch.spawn_scheduler();

    let first = orch.queue.submit(request("acme", "v1", "a.spec")).await.unwrap();
    // Resubmitting while the first is still in flight dedups against it,
    // whether it is queued, scheduled, or already running.
    let second = orch.queue.submit(request("acme", "v1", "a.spec")).await.unwrap();

    assert_eq!(second.job_id, first.job_id);
    assert_eq!(second.message, "duplicate");
    token.cancel();
}

/// Scenario: a flaky suite fails every run; retries re-queue it until the
/// budget is spent, after which the job is pinned failed.
#[tokio::test]
async fn test_retry_until_exhaustion() {
    let orch = TestOrchestrator::with_executor(ScriptedExecutor::with_outcomes(vec![
        TestOutcome::Fail,
        TestOutcome::Fail,
        TestOutcome::Fail,
        TestOutcome::Fail,
    ]));
    let id = orch.submit(request("acme", "v1", "flaky.spec")).await;

    for attempt in 1..=3u32 {
        orch.tick().await;
        assert_eq!(orch.job(&id).await.status, JobStatus::Failed);

        let retried = orch.queue.retry(&id).await.unwrap();
        assert_eq!(retried.status, JobStatus::Queued);
        assert_eq!(retried.retry_count, attempt);
        assert!(retried.error.is_none());
    }

    // Fourth run consumes the last retry; the budget is now spent.
    orch.tick().await;
    assert_eq!(orch.job(&id).await.status, JobStatus::Failed);

    let denied = orch.queue.retry(&id).await;
    assert!(matches!(denied, Err(Error::InvalidState(_))));

    let job = orch.job(&id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("Max retries exceeded"));
    assert_eq!(job.retry_count, 3);

    // Four executions total: the original run plus three retries.
    assert_eq!(orch.executor.executed().await.len(), 4);
}

/// Scenario: the process dies mid-execution; on restart the job is reset,
/// re-queued, and finishes on the next pass.
#[tokio::test]
async fn test_crash_mid_execution_recovers_on_restart() {
    let orch = TestOrchestrator::with_executor(
        ScriptedExecutor::passing().with_latency(Duration::from_secs(5)),
    );
    let handle = tokio::spawn(orch.scheduler.clone().run(CancellationToken::new()));

    let id = orch.submit(request("acme", "v1", "a.spec")).await;

    let queue = orch.queue.clone();
    let running_id = id.clone();
    assert_eventually(
        || {
            let queue = queue.clone();
            let id = running_id.clone();
            async move { queue.get(&id).await.unwrap().status == JobStatus::Running }
        },
        Duration::from_secs(2),
        "job should reach running before the crash",
    )
    .await;

    // Kill the process mid-test-run.
    handle.abort();

    let restarted = TestOrchestrator::restarted(orch.store.clone());
    restarted.scheduler.recover().await.unwrap();

    let job = restarted.job(&id).await;
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.agent_id.is_none());
    assert!(job.device_id.is_none());
    assert_eq!(job.error.as_deref(), Some(RESTART_RESET_ERROR));

    restarted.tick().await;
    let job = restarted.job(&id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
}

/// Lifecycle monotonicity: polling the record during a full run only ever
/// observes forward transitions.
#[tokio::test]
async fn test_observed_statuses_are_monotone() {
    let orch = TestOrchestrator::with_executor(
        ScriptedExecutor::passing().with_latency(Duration::from_millis(100)),
    );
    let token = orch.spawn_scheduler();
    let id = orch.submit(request("acme", "v1", "a.spec")).await;

    fn stage(status: JobStatus) -> u8 {
        match status {
            JobStatus::Queued => 0,
            JobStatus::Retrying => 0,
            JobStatus::Scheduled => 1,
            JobStatus::Running => 2,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 3,
        }
    }

    let mut observed = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let status = orch.job(&id).await.status;
        observed.push(status);
        if status.is_terminal() || tokio::time::Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    token.cancel();

    assert_eq!(*observed.last().unwrap(), JobStatus::Completed);
    for pair in observed.windows(2) {
        assert!(
            stage(pair[0]) <= stage(pair[1]),
            "status went backwards: {:?}",
            pair
        );
    }
}
