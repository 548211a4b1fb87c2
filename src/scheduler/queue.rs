use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::scheduler::job::{Job, JobStatus, Priority, SubmitRequest, Target};
use crate::store::JobStore;

/// Response to a submission: either the created job or, on dedup, the
/// already-active one.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    pub groups: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl GroupStatus {
    /// Aggregate status of a set of group members: running beats failed
    /// beats completed beats queued.
    pub fn of(members: &[Job]) -> Self {
        if members.iter().any(|j| j.status == JobStatus::Running) {
            GroupStatus::Running
        } else if members.iter().any(|j| j.status == JobStatus::Failed) {
            GroupStatus::Failed
        } else if !members.is_empty() && members.iter().all(|j| j.status == JobStatus::Completed) {
            GroupStatus::Completed
        } else {
            GroupStatus::Queued
        }
    }
}

/// Summary of one derived group of compatible jobs.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub group_id: String,
    pub org_id: String,
    pub app_version_id: String,
    pub target: Target,
    pub job_count: usize,
    pub status: GroupStatus,
    pub oldest_job: DateTime<Utc>,
    pub newest_job: DateTime<Utc>,
}

/// Submission gateway and read API over the job store.
///
/// All filtered queries are full scans; the store owns every record and
/// this type holds no state beyond defaults, so it is freely cloneable.
#[derive(Clone)]
pub struct Queue {
    store: Arc<dyn JobStore>,
    default_priority: Priority,
    default_target: Target,
    default_max_retries: u32,
}

impl Queue {
    pub fn new(
        store: Arc<dyn JobStore>,
        default_priority: Priority,
        default_target: Target,
        default_max_retries: u32,
    ) -> Self {
        Self {
            store,
            default_priority,
            default_target,
            default_max_retries,
        }
    }

    /// Validate and persist a submission.
    ///
    /// If an active job (queued, scheduled, or running) already exists for
    /// the same `(org_id, app_version_id, test_path, target)` tuple, no new
    /// record is written and the existing job is returned with message
    /// `"duplicate"`.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitReceipt> {
        request.validate()?;

        let target = request.target.unwrap_or(self.default_target);
        let key = (
            request.org_id.as_str(),
            request.app_version_id.as_str(),
            request.test_path.as_str(),
            target,
        );
        for existing in self.store.scan().await? {
            let active = matches!(
                existing.status,
                JobStatus::Queued | JobStatus::Scheduled | JobStatus::Running
            );
            if active && existing.dedup_key() == key {
                tracing::info!(
                    job_id = %existing.job_id,
                    status = %existing.status,
                    "Duplicate submission, returning active job"
                );
                return Ok(SubmitReceipt {
                    job_id: existing.job_id,
                    status: existing.status,
                    message: "duplicate".to_string(),
                });
            }
        }

        let job = request.into_job(
            self.default_priority,
            self.default_target,
            self.default_max_retries,
            Utc::now(),
        );
        self.store.put(&job).await?;
        tracing::info!(
            job_id = %job.job_id,
            group_id = %job.group_id,
            target = %job.target,
            priority = %job.priority,
            "Job submitted"
        );
        Ok(SubmitReceipt {
            job_id: job.job_id,
            status: job.status,
            message: "created".to_string(),
        })
    }

    pub async fn get(&self, job_id: &str) -> Result<Job> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| Error::NotFound(job_id.to_string()))
    }

    /// Jobs for one org, optionally filtered by status, newest first.
    pub async fn list(&self, org_id: &str, status: Option<JobStatus>) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .store
            .scan()
            .await?
            .into_iter()
            .filter(|j| j.org_id == org_id)
            .filter(|j| status.map_or(true, |s| j.status == s))
            .collect();
        jobs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(jobs)
    }

    /// Cancel a job that has not yet reached a terminal status.
    ///
    /// Concurrent cancel vs. scheduler assignment resolves last-writer-wins:
    /// the scheduler re-reads before execution and honors the terminal state.
    pub async fn cancel(&self, job_id: &str) -> Result<Job> {
        let mut job = self.get(job_id).await?;
        if job.is_terminal() {
            return Err(Error::InvalidState(format!(
                "cannot cancel job in {} state",
                job.status
            )));
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        self.store.put(&job).await?;
        tracing::info!(job_id = %job.job_id, "Job cancelled");
        Ok(job)
    }

    /// Re-queue a failed job, consuming one retry.
    ///
    /// Once `retry_count` has reached `max_retries` the job is pinned to
    /// `failed` with the canonical error and further retries are rejected.
    pub async fn retry(&self, job_id: &str) -> Result<Job> {
        let mut job = self.get(job_id).await?;
        if !matches!(job.status, JobStatus::Failed | JobStatus::Retrying) {
            return Err(Error::InvalidState(format!(
                "cannot retry job in {} state",
                job.status
            )));
        }
        if job.retry_count >= job.max_retries {
            job.status = JobStatus::Failed;
            job.error = Some("Max retries exceeded".to_string());
            self.store.put(&job).await?;
            return Err(Error::InvalidState("Max retries exceeded".to_string()));
        }
        job.retry_count += 1;
        job.status = JobStatus::Queued;
        job.error = None;
        job.started_at = None;
        job.completed_at = None;
        job.device_id = None;
        job.agent_id = None;
        self.store.put(&job).await?;
        tracing::info!(
            job_id = %job.job_id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            "Job re-queued for retry"
        );
        Ok(job)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let jobs = self.store.scan().await?;
        let mut stats = QueueStats {
            waiting: 0,
            active: 0,
            completed: 0,
            failed: 0,
            total: jobs.len(),
            groups: 0,
        };
        let mut group_ids = std::collections::HashSet::new();
        for job in &jobs {
            match job.status {
                JobStatus::Queued | JobStatus::Scheduled => stats.waiting += 1,
                JobStatus::Running => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled | JobStatus::Retrying => {}
            }
            if !job.is_terminal() {
                group_ids.insert(job.group_id.as_str());
            }
        }
        stats.groups = group_ids.len();
        Ok(stats)
    }

    /// Bucket non-terminal jobs by group, oldest group first.
    pub async fn groups(&self) -> Result<Vec<GroupSummary>> {
        let mut buckets: BTreeMap<String, Vec<Job>> = BTreeMap::new();
        for job in self.store.scan().await? {
            if !job.is_terminal() {
                buckets.entry(job.group_id.clone()).or_default().push(job);
            }
        }

        let mut summaries: Vec<GroupSummary> = buckets
            .into_values()
            .map(|mut members| {
                sort_for_execution(&mut members);
                let oldest = members.iter().map(|j| j.timestamp).min().unwrap();
                let newest = members.iter().map(|j| j.timestamp).max().unwrap();
                let first = &members[0];
                GroupSummary {
                    group_id: first.group_id.clone(),
                    org_id: first.org_id.clone(),
                    app_version_id: first.app_version_id.clone(),
                    target: first.target,
                    job_count: members.len(),
                    status: GroupStatus::of(&members),
                    oldest_job: oldest,
                    newest_job: newest,
                }
            })
            .collect();
        summaries.sort_by_key(|g| g.oldest_job);
        Ok(summaries)
    }

    /// Non-terminal members of one group in execution order.
    pub async fn group_members(&self, group_id: &str) -> Result<Vec<Job>> {
        let mut members: Vec<Job> = self
            .store
            .scan()
            .await?
            .into_iter()
            .filter(|j| j.group_id == group_id && !j.is_terminal())
            .collect();
        sort_for_execution(&mut members);
        Ok(members)
    }
}

/// Priority descending, then submission time ascending.
fn sort_for_execution(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| {
        b.priority
            .rank()
            .cmp(&a.priority.rank())
            .then(a.timestamp.cmp(&b.timestamp))
    });
}
