use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Emulator,
    Device,
    Browserstack,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Emulator => write!(f, "emulator"),
            Target::Device => write!(f, "device"),
            Target::Browserstack => write!(f, "browserstack"),
        }
    }
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emulator" => Ok(Target::Emulator),
            "device" => Ok(Target::Device),
            "browserstack" => Ok(Target::Browserstack),
            other => Err(format!("unknown target: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Numeric rank used for ordering inside a group (higher runs first).
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
    Retrying,
}

impl JobStatus {
    /// Terminal statuses are never left except via `retry` (failed only).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Scheduled => write!(f, "scheduled"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
            JobStatus::Retrying => write!(f, "retrying"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "scheduled" => Ok(JobStatus::Scheduled),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "retrying" => Ok(JobStatus::Retrying),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// A single test-execution request with lifecycle state.
///
/// The job store owns every record; the queue and scheduler hold transient
/// copies that are read-modify-written back. Field order is the persisted
/// JSON key order and must stay stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub org_id: String,
    pub app_version_id: String,
    pub test_path: String,
    pub target: Target,
    pub priority: Priority,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timestamp: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub agent_id: Option<String>,
    pub group_id: String,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Identity tuple used for submission deduplication.
    pub fn dedup_key(&self) -> (&str, &str, &str, Target) {
        (
            &self.org_id,
            &self.app_version_id,
            &self.test_path,
            self.target,
        )
    }
}

/// Derive the group key shared by jobs that can amortize one app install.
pub fn group_id(org_id: &str, app_version_id: &str, target: Target) -> String {
    format!("{org_id}_{app_version_id}_{target}")
}

/// Generate a job ID of the form `job_{ms-since-epoch}_{8 hex chars}`.
pub fn generate_job_id(now: DateTime<Utc>) -> String {
    format!(
        "job_{}_{:08x}",
        now.timestamp_millis(),
        rand::random::<u32>()
    )
}

/// Submission payload accepted by the queue.
///
/// Only the identity tuple is required. The execution fields are passed
/// through verbatim when present so exported job records can be re-imported
/// into a fresh deployment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitRequest {
    pub org_id: String,
    pub app_version_id: String,
    pub test_path: String,
    pub target: Option<Target>,
    pub priority: Option<Priority>,
    pub timestamp: Option<DateTime<Utc>>,
    pub job_id: Option<String>,
    pub max_retries: Option<u32>,
    // State-import passthrough.
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub retry_count: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub agent_id: Option<String>,
}

impl SubmitRequest {
    pub fn validate(&self) -> crate::error::Result<()> {
        let org_len = self.org_id.chars().count();
        if org_len == 0 || org_len > 100 {
            return Err(crate::error::Error::Validation(
                "org_id must be 1-100 characters".to_string(),
            ));
        }
        let app_len = self.app_version_id.chars().count();
        if app_len == 0 || app_len > 100 {
            return Err(crate::error::Error::Validation(
                "app_version_id must be 1-100 characters".to_string(),
            ));
        }
        if self.test_path.is_empty() {
            return Err(crate::error::Error::Validation(
                "test_path must not be empty".to_string(),
            ));
        }
        if let Some(p) = self.progress {
            if p > 100 {
                return Err(crate::error::Error::Validation(
                    "progress must be 0-100".to_string(),
                ));
            }
        }
        if self.max_retries == Some(0) {
            return Err(crate::error::Error::Validation(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the job record, filling defaults for anything not supplied.
    pub fn into_job(
        self,
        default_priority: Priority,
        default_target: Target,
        default_max_retries: u32,
        now: DateTime<Utc>,
    ) -> Job {
        let target = self.target.unwrap_or(default_target);
        let group_id = group_id(&self.org_id, &self.app_version_id, target);
        Job {
            job_id: self.job_id.unwrap_or_else(|| generate_job_id(now)),
            org_id: self.org_id,
            app_version_id: self.app_version_id,
            test_path: self.test_path,
            target,
            priority: self.priority.unwrap_or(default_priority),
            status: self.status.unwrap_or(JobStatus::Queued),
            progress: self.progress.unwrap_or(0),
            result: None,
            error: None,
            retry_count: self.retry_count.unwrap_or(0),
            max_retries: self.max_retries.unwrap_or(default_max_retries),
            timestamp: self.timestamp.unwrap_or(now),
            started_at: self.started_at,
            completed_at: self.completed_at,
            device_id: self.device_id,
            agent_id: self.agent_id,
            group_id,
        }
    }
}
