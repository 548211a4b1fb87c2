use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;
use crate::scheduler::job::Job;
use crate::store::JobStore;

const KEY_PREFIX: &str = "job:";

/// Redis-backed job store. One key per record (`job:{job_id}`), JSON value.
///
/// The connection manager reconnects on its own; transient I/O errors
/// surface as `StoreUnavailable` and the caller retries on its next tick.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        tracing::info!(url, "Connected to Redis job store");
        Ok(Self { manager })
    }

    fn key(job_id: &str) -> String {
        format!("{KEY_PREFIX}{job_id}")
    }
}

#[async_trait]
impl JobStore for RedisStore {
    async fn put(&self, job: &Job) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.manager.clone();
        let _: () = conn.set(Self::key(&job.job_id), payload).await?;
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>> {
        let mut conn = self.manager.clone();
        let payload: Option<String> = conn.get(Self::key(job_id)).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn scan(&self) -> Result<Vec<Job>> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = {
            let mut iter: redis::AsyncIter<'_, String> =
                conn.scan_match(format!("{KEY_PREFIX}*")).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            // A key may vanish between SCAN and GET; skip it.
            let payload: Option<String> = conn.get(&key).await?;
            if let Some(payload) = payload {
                match serde_json::from_str(&payload) {
                    Ok(job) => jobs.push(job),
                    Err(e) => {
                        tracing::warn!(key, error = %e, "Skipping undecodable job record");
                    }
                }
            }
        }
        Ok(jobs)
    }

    async fn delete(&self, job_id: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.del(Self::key(job_id)).await?;
        Ok(())
    }
}
