use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::scheduler::job::Job;
use crate::store::JobStore;

/// In-process store used by tests and `--store-url memory`.
///
/// Records go through the same JSON serialization path as the Redis
/// backend, so serialization bugs surface in tests too.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn put(&self, job: &Job) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        self.records
            .write()
            .await
            .insert(job.job_id.clone(), payload);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>> {
        let records = self.records.read().await;
        match records.get(job_id) {
            Some(payload) => Ok(Some(serde_json::from_str(payload)?)),
            None => Ok(None),
        }
    }

    async fn scan(&self) -> Result<Vec<Job>> {
        let records = self.records.read().await;
        let mut jobs = Vec::with_capacity(records.len());
        for payload in records.values() {
            jobs.push(serde_json::from_str(payload)?);
        }
        Ok(jobs)
    }

    async fn delete(&self, job_id: &str) -> Result<()> {
        self.records.write().await.remove(job_id);
        Ok(())
    }
}
