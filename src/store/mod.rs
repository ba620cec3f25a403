//! Task persistence — durable `OrchestrationContext` storage by task id.
//!
//! One logical record per task id, guarded by an etag the writer must
//! present: a mismatched (or unexpectedly present) etag fails the write with
//! `CasConflict` so concurrent turns never silently overwrite each other.
//! Reads are unguarded. [`InMemoryTaskStore`] backs tests and Redis-less
//! deployments with the same contract as the Redis implementation.

mod redis;

pub use self::redis::RedisTaskStore;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::context::TaskPersistenceRecord;
use crate::error::{OrchestratorError, OrchestratorResult};

/// Durable store of task persistence records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Load the record for a task id. Expired records read as `None`.
    async fn load(&self, task_id: &str) -> OrchestratorResult<Option<TaskPersistenceRecord>>;

    /// Store a record, compare-and-swap on the existing etag.
    ///
    /// `expected_etag` is the etag observed at load time, or `None` when the
    /// writer expects no record to exist yet. A mismatch fails with
    /// [`OrchestratorError::CasConflict`] and writes nothing.
    async fn store(
        &self,
        record: TaskPersistenceRecord,
        expected_etag: Option<&str>,
    ) -> OrchestratorResult<()>;

    /// Remove the record for a task id. Succeeds when absent.
    async fn delete(&self, task_id: &str) -> OrchestratorResult<()>;
}

/// In-memory task store with the same CAS semantics as Redis.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    records: RwLock<HashMap<String, TaskPersistenceRecord>>,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn load(&self, task_id: &str) -> OrchestratorResult<Option<TaskPersistenceRecord>> {
        let records = self.records.read().await;
        let record = records.get(task_id).filter(|r| !r.is_expired()).cloned();
        debug!(task_id, found = record.is_some(), "task record lookup");
        Ok(record)
    }

    async fn store(
        &self,
        record: TaskPersistenceRecord,
        expected_etag: Option<&str>,
    ) -> OrchestratorResult<()> {
        let mut records = self.records.write().await;
        let current = records.get(&record.task_id).filter(|r| !r.is_expired());
        match (current, expected_etag) {
            (None, None) => {}
            (Some(existing), Some(expected)) if existing.etag == expected => {}
            _ => {
                return Err(OrchestratorError::CasConflict {
                    task_id: record.task_id.clone(),
                });
            }
        }
        debug!(task_id = %record.task_id, etag = %record.etag, "task record stored");
        records.insert(record.task_id.clone(), record);
        Ok(())
    }

    async fn delete(&self, task_id: &str) -> OrchestratorResult<()> {
        let mut records = self.records.write().await;
        records.remove(task_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OrchestrationContext;
    use std::time::Duration;

    fn record(task_id: &str) -> TaskPersistenceRecord {
        let ctx = OrchestrationContext::new("s-1");
        TaskPersistenceRecord::encode(task_id, &ctx, Duration::from_secs(60)).unwrap()
    }

    #[tokio::test]
    async fn round_trip_preserves_record() {
        let store = InMemoryTaskStore::new();
        let rec = record("t-1");
        store.store(rec.clone(), None).await.unwrap();
        let loaded = store.load("t-1").await.unwrap().unwrap();
        assert_eq!(loaded, rec);
    }

    #[tokio::test]
    async fn first_write_requires_absent_record() {
        let store = InMemoryTaskStore::new();
        store.store(record("t-1"), None).await.unwrap();
        // A second no-etag write must conflict.
        let err = store.store(record("t-1"), None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::CasConflict { .. }));
    }

    #[tokio::test]
    async fn stale_etag_conflicts() {
        let store = InMemoryTaskStore::new();
        let first = record("t-1");
        store.store(first.clone(), None).await.unwrap();

        let second = record("t-1");
        store
            .store(second.clone(), Some(&first.etag))
            .await
            .unwrap();

        // Writing again with the superseded etag loses the race.
        let third = record("t-1");
        let err = store.store(third, Some(&first.etag)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::CasConflict { .. }));
    }

    #[tokio::test]
    async fn expired_records_read_as_absent() {
        let store = InMemoryTaskStore::new();
        let mut rec = record("t-1");
        rec.expires_at_utc = (chrono::Utc::now() - chrono::Duration::seconds(1)).to_rfc3339();
        store.store(rec, None).await.unwrap();
        assert!(store.load("t-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryTaskStore::new();
        store.store(record("t-1"), None).await.unwrap();
        store.delete("t-1").await.unwrap();
        store.delete("t-1").await.unwrap();
        assert!(store.load("t-1").await.unwrap().is_none());
    }
}
