//! Job queue, grouping, and scheduling.
//!
//! Jobs move `queued → scheduled → running → completed|failed` driven by a
//! periodic tick. Compatible jobs (same org, app version, and target) form
//! a group and execute sequentially on one device so the app install cost
//! is paid once. The backing store has no compare-and-swap, so every write
//! re-reads the record first and validates the expected pre-state; a
//! terminal status observed at any point is honored and never overwritten.

pub mod job;
pub mod pool;
pub mod queue;

pub use job::{Job, JobStatus, Priority, SubmitRequest, Target};
pub use pool::ResourcePool;
pub use queue::{GroupStatus, GroupSummary, Queue, QueueStats, SubmitReceipt};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::store::JobStore;
use crate::worker::{TestExecutor, TestOutcome};

/// Error recorded on jobs demoted back to `queued` by startup recovery.
pub const RESTART_RESET_ERROR: &str = "Job reset due to server restart";

/// Drives jobs from `queued` to a terminal status.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    queue: Queue,
    pool: Arc<RwLock<ResourcePool>>,
    executor: Arc<dyn TestExecutor>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Queue,
        pool: Arc<RwLock<ResourcePool>>,
        executor: Arc<dyn TestExecutor>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            pool,
            executor,
            tick_interval,
        }
    }

    /// Startup recovery: demote orphaned `scheduled`/`running` jobs back to
    /// `queued` so they become re-eligible for assignment.
    ///
    /// The pool is process-local and empty after a restart, so any job that
    /// still claims a device is in-flight work the previous process lost.
    /// Best-effort: a record that fails to reset is logged and skipped.
    /// `retry_count` is untouched — a restart is not a test failure.
    pub async fn recover(&self) -> Result<usize> {
        let mut reset = 0;
        for mut job in self.store.scan().await? {
            if !matches!(job.status, JobStatus::Scheduled | JobStatus::Running) {
                continue;
            }
            let prior = job.status;
            job.status = JobStatus::Queued;
            job.agent_id = None;
            job.device_id = None;
            job.started_at = None;
            job.error = Some(RESTART_RESET_ERROR.to_string());
            match self.store.put(&job).await {
                Ok(()) => {
                    reset += 1;
                    tracing::info!(
                        job_id = %job.job_id,
                        prior_status = %prior,
                        "Job reset due to server restart"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job.job_id,
                        error = %e,
                        "Failed to reset job during recovery"
                    );
                }
            }
        }
        if reset > 0 {
            tracing::info!(count = reset, "Startup recovery complete");
        }
        Ok(reset)
    }

    /// Run the tick loop until the token is cancelled.
    ///
    /// A tick runs to completion (including in-group execution) before the
    /// next one fires; long test runs simply delay the following tick.
    /// A failed tick is logged and retried at the next interval.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Tick abandoned, will retry");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Scheduler loop stopped");
                    break;
                }
            }
        }
    }

    /// One scheduling pass: form groups and process every live one.
    pub async fn tick(&self) -> Result<()> {
        let stats = self.queue.stats().await?;
        if stats.waiting == 0 {
            return Ok(());
        }
        for group in self.queue.groups().await? {
            if matches!(group.status, GroupStatus::Queued | GroupStatus::Running) {
                self.process_group(&group).await?;
            }
        }
        Ok(())
    }

    /// Assign one group to a device and execute its members sequentially.
    async fn process_group(&self, group: &GroupSummary) -> Result<()> {
        let members = self.queue.group_members(&group.group_id).await?;

        // Jobs already locked to a device take precedence: this resumes the
        // normal scheduled→running transition and also recovers a group that
        // was locked right before a mid-tick crash.
        let bound: Vec<Job> = members
            .iter()
            .filter(|j| {
                j.status == JobStatus::Scheduled && j.agent_id.is_some() && j.device_id.is_some()
            })
            .cloned()
            .collect();

        let (agent_id, device_id, candidates) = if let Some(first) = bound.first() {
            let agent_id = first.agent_id.clone().unwrap();
            let device_id = first.device_id.clone().unwrap();
            if !self.pool.read().await.is_available(&agent_id, &device_id) {
                return Ok(());
            }
            (agent_id, device_id, bound)
        } else {
            let queued: Vec<Job> = members
                .iter()
                .filter(|j| j.status == JobStatus::Queued)
                .cloned()
                .collect();
            if queued.is_empty() {
                return Ok(());
            }
            let Some((agent_id, device_id)) = self.pool.read().await.find_available(group.target)
            else {
                tracing::debug!(group_id = %group.group_id, target = %group.target, "No capacity");
                return Ok(());
            };
            (agent_id, device_id, queued)
        };

        // Lock: re-read each candidate and only claim it if its state still
        // allows this assignment. The store has no CAS; this re-read is the
        // atomicity primitive.
        let mut locked: Vec<Job> = Vec::new();
        for candidate in &candidates {
            let Some(mut current) = self.store.get(&candidate.job_id).await? else {
                continue;
            };
            match current.status {
                JobStatus::Queued => {
                    current.status = JobStatus::Scheduled;
                    current.agent_id = Some(agent_id.clone());
                    current.device_id = Some(device_id.clone());
                    self.store.put(&current).await?;
                    tracing::info!(
                        job_id = %current.job_id,
                        agent_id = %agent_id,
                        device_id = %device_id,
                        "Job locked to device"
                    );
                    locked.push(current);
                }
                JobStatus::Scheduled if current.agent_id.as_deref() == Some(&agent_id) => {
                    locked.push(current);
                }
                _ => {}
            }
        }
        if locked.is_empty() {
            return Ok(());
        }

        let job_ids: Vec<String> = locked.iter().map(|j| j.job_id.clone()).collect();
        self.pool.write().await.acquire(&device_id, job_ids);

        let total = locked.len();
        let mut outcome = Ok(());
        for (index, job) in locked.iter().enumerate() {
            if let Err(e) = self.execute_job(&job.job_id, index, total).await {
                outcome = Err(e);
                break;
            }
        }

        // The device must come back even when a store error aborts the group.
        self.pool.write().await.release(&device_id);
        outcome
    }

    /// Run one locked job through the executor.
    ///
    /// Re-reads the record before starting and again after the test so a
    /// concurrent cancel (or any terminal transition) is honored instead of
    /// overwritten; in that case the device outcome is discarded.
    async fn execute_job(&self, job_id: &str, index: usize, total: usize) -> Result<()> {
        let Some(mut job) = self.store.get(job_id).await? else {
            return Ok(());
        };
        if job.is_terminal() {
            tracing::debug!(job_id, status = %job.status, "Skipping terminal job");
            return Ok(());
        }

        job.status = JobStatus::Running;
        if job.started_at.is_none() {
            job.started_at = Some(Utc::now());
        }
        self.store.put(&job).await?;

        let report = self.executor.run(&job).await;

        let Some(mut current) = self.store.get(job_id).await? else {
            return Ok(());
        };
        if current.is_terminal() {
            tracing::info!(
                job_id,
                status = %current.status,
                "Job reached terminal state during execution, discarding outcome"
            );
            return Ok(());
        }

        let was_running = current.status == JobStatus::Running;
        match report {
            Ok(report) if report.outcome == TestOutcome::Pass => {
                current.status = JobStatus::Completed;
                current.result = Some(report.message);
                current.error = None;
                if was_running {
                    current.progress = 100;
                }
            }
            Ok(report) => {
                current.status = JobStatus::Failed;
                current.error = Some(report.message);
            }
            Err(e) => {
                current.status = JobStatus::Failed;
                current.error = Some(e.to_string());
            }
        }
        current.completed_at = Some(Utc::now());
        self.store.put(&current).await?;
        tracing::info!(
            job_id,
            status = %current.status,
            position = index + 1,
            of = total,
            "Test finished"
        );
        Ok(())
    }
}
