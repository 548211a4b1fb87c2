//! Durable key→value persistence for job records.
//!
//! All higher-level atomicity (dedup, status transitions) is built on
//! read-modify-write against this store. `scan` is not snapshot-consistent,
//! so callers must re-`get` a record before acting on it.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::scheduler::job::Job;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Unconditional single-key write. Read-your-writes: a subsequent `get`
    /// of the same ID observes the written value.
    async fn put(&self, job: &Job) -> Result<()>;

    /// Fetch one record by ID.
    async fn get(&self, job_id: &str) -> Result<Option<Job>>;

    /// Full scan of all records. No snapshot semantics.
    async fn scan(&self) -> Result<Vec<Job>>;

    /// Remove a record. Deleting a missing key is not an error.
    async fn delete(&self, job_id: &str) -> Result<()>;
}

/// Open a store from a URL. `memory` selects the in-process store;
/// `redis://` / `rediss://` select the Redis backend.
pub async fn connect(url: &str) -> Result<Arc<dyn JobStore>> {
    if url == "memory" {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        return Ok(Arc::new(RedisStore::connect(url).await?));
    }
    Err(Error::Validation(format!("unsupported store url: {url}")))
}
