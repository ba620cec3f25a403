//! Redis-backed task store.
//!
//! Layout: `lucia:task:{taskId}` holds the serialized record and
//! `lucia:task:{taskId}:etag` the concurrency token. Both are written in one
//! Lua script that verifies the expected etag first, so a lost CAS race
//! leaves the stored record untouched. The TTL rides on both keys.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::debug;

use crate::context::TaskPersistenceRecord;
use crate::error::{OrchestratorError, OrchestratorResult};

use super::TaskStore;

/// Compare-and-swap write: checks the etag key, then sets payload and etag
/// with the TTL. Returns 1 on success, 0 on a lost race.
const CAS_WRITE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[2])
if ARGV[1] == '' then
    if current then return 0 end
else
    if not current or current ~= ARGV[1] then return 0 end
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', tonumber(ARGV[4]))
redis.call('SET', KEYS[2], ARGV[3], 'EX', tonumber(ARGV[4]))
return 1
"#;

/// [`TaskStore`] backed by Redis.
pub struct RedisTaskStore {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisTaskStore {
    /// Connect to the given Redis URL with the configured record TTL.
    pub fn new(url: &str, ttl: std::time::Duration) -> OrchestratorResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| OrchestratorError::persistence(format!("redis client: {e}")))?;
        Ok(Self {
            client,
            ttl_secs: ttl.as_secs().max(1),
        })
    }

    async fn connection(&self) -> OrchestratorResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| OrchestratorError::persistence(format!("redis connect: {e}")))
    }

    fn payload_key(task_id: &str) -> String {
        format!("lucia:task:{task_id}")
    }

    fn etag_key(task_id: &str) -> String {
        format!("lucia:task:{task_id}:etag")
    }
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn load(&self, task_id: &str) -> OrchestratorResult<Option<TaskPersistenceRecord>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(Self::payload_key(task_id)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let record: TaskPersistenceRecord = serde_json::from_str(&raw)
            .map_err(|e| OrchestratorError::persistence(format!("decode task record: {e}")))?;
        debug!(task_id, etag = %record.etag, "task record loaded from redis");
        Ok(Some(record).filter(|r| !r.is_expired()))
    }

    async fn store(
        &self,
        record: TaskPersistenceRecord,
        expected_etag: Option<&str>,
    ) -> OrchestratorResult<()> {
        let payload = serde_json::to_string(&record)
            .map_err(|e| OrchestratorError::persistence(format!("encode task record: {e}")))?;

        let mut conn = self.connection().await?;
        let written: i64 = Script::new(CAS_WRITE_SCRIPT)
            .key(Self::payload_key(&record.task_id))
            .key(Self::etag_key(&record.task_id))
            .arg(expected_etag.unwrap_or(""))
            .arg(payload)
            .arg(&record.etag)
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        if written == 0 {
            return Err(OrchestratorError::CasConflict {
                task_id: record.task_id.clone(),
            });
        }
        debug!(task_id = %record.task_id, etag = %record.etag, "task record stored in redis");
        Ok(())
    }

    async fn delete(&self, task_id: &str) -> OrchestratorResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(&[Self::payload_key(task_id), Self::etag_key(task_id)])
            .await?;
        Ok(())
    }
}
