//! Per-conversation orchestration state and its persisted form.
//!
//! An [`OrchestrationContext`] travels through one request (router, wrappers,
//! aggregator all see the same value) and survives across turns either in the
//! session cache or, for long-running tasks, as a [`TaskPersistenceRecord`]
//! in the task store.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OrchestratorError, OrchestratorResult};

/// One completed exchange: what the user said and what came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    /// Message id of the user turn; duplicate detection keys on this.
    pub message_id: String,

    /// The user's utterance.
    pub user_text: String,

    /// The aggregated reply.
    pub reply_text: String,

    /// Agents that produced the reply, in router order.
    pub agents_used: Vec<String>,

    /// Whether the reply was a clarifying question.
    pub needs_input: bool,

    /// RFC-3339 timestamp of the exchange.
    pub timestamp: String,
}

/// Per-conversation state blob threaded through the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationContext {
    /// Stable conversation identifier.
    pub session_id: String,

    /// Present when the caller is resuming a long-running workflow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    /// Prior turns, oldest first, bounded by the configured cap.
    #[serde(default)]
    pub history: Vec<ConversationTurn>,

    /// Agent id → opaque thread handle owned by that agent's invoker.
    #[serde(default)]
    pub agent_threads: HashMap<String, String>,

    /// The agent that answered the previous turn, enabling handoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_agent_id: Option<String>,

    /// Extension slot for future fields.
    #[serde(default)]
    pub state_bag: serde_json::Map<String, serde_json::Value>,
}

impl OrchestrationContext {
    /// Create a fresh context for a session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            task_id: None,
            history: Vec::new(),
            agent_threads: HashMap::new(),
            previous_agent_id: None,
            state_bag: serde_json::Map::new(),
        }
    }

    /// Append a turn, evicting the oldest entries beyond `cap`.
    pub fn push_turn(&mut self, turn: ConversationTurn, cap: usize) {
        self.history.push(turn);
        if self.history.len() > cap {
            let excess = self.history.len() - cap;
            self.history.drain(..excess);
        }
    }

    /// Find a prior turn by its message id.
    pub fn find_turn(&self, message_id: &str) -> Option<&ConversationTurn> {
        self.history.iter().find(|t| t.message_id == message_id)
    }
}

/// Session id resolution, in priority order: explicit argument, A2A
/// `contextId`, device id from the prompt's `REQUEST_CONTEXT:` block,
/// generated UUID.
pub fn resolve_session_id(
    explicit: Option<&str>,
    context_id: Option<&str>,
    user_text: &str,
) -> String {
    if let Some(id) = explicit.filter(|s| !s.trim().is_empty()) {
        return id.to_string();
    }
    if let Some(id) = context_id.filter(|s| !s.trim().is_empty()) {
        return id.to_string();
    }
    if let Some(device) = extract_device_id(user_text) {
        return device;
    }
    Uuid::new_v4().to_string()
}

/// Pull a Home Assistant device id out of a `REQUEST_CONTEXT:` block.
///
/// The block is the remainder of the marker line, either a JSON object with
/// a `device_id` key or a bare `device_id=<value>` pair. Malformed blocks
/// fall through to `None`.
pub fn extract_device_id(user_text: &str) -> Option<String> {
    let rest = user_text
        .lines()
        .find_map(|line| line.trim().strip_prefix("REQUEST_CONTEXT:"))?
        .trim();

    if rest.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(rest).ok()?;
        return value
            .get("device_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
    }

    rest.split(|c: char| c.is_whitespace() || c == ',')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == "device_id")
        .map(|(_, value)| value.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// The task store's record shape: one serialized context per task id, plus
/// the concurrency token and expiry the store enforces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPersistenceRecord {
    /// The task id this record is keyed by.
    pub task_id: String,

    /// Serialized `OrchestrationContext` JSON.
    pub context_payload: String,

    /// RFC-3339 expiry; the store's TTL enforces it.
    pub expires_at_utc: String,

    /// Concurrency token, regenerated on every write.
    pub etag: String,
}

impl TaskPersistenceRecord {
    /// Serialize a context into a record with a fresh etag.
    pub fn encode(
        task_id: impl Into<String>,
        context: &OrchestrationContext,
        ttl: std::time::Duration,
    ) -> OrchestratorResult<Self> {
        let payload = serde_json::to_string(context)
            .map_err(|e| OrchestratorError::persistence(format!("serialize context: {e}")))?;
        let expires = chrono::Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        Ok(Self {
            task_id: task_id.into(),
            context_payload: payload,
            expires_at_utc: expires.to_rfc3339(),
            etag: Uuid::new_v4().to_string(),
        })
    }

    /// Deserialize the payload back into a context.
    pub fn decode(&self) -> OrchestratorResult<OrchestrationContext> {
        serde_json::from_str(&self.context_payload)
            .map_err(|e| OrchestratorError::persistence(format!("deserialize context: {e}")))
    }

    /// Whether the record's expiry has passed.
    pub fn is_expired(&self) -> bool {
        match chrono::DateTime::parse_from_rfc3339(&self.expires_at_utc) {
            Ok(expires) => expires < chrono::Utc::now(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn turn(message_id: &str) -> ConversationTurn {
        ConversationTurn {
            message_id: message_id.to_string(),
            user_text: "turn on the lights".to_string(),
            reply_text: "done".to_string(),
            agents_used: vec!["light-agent".to_string()],
            needs_input: false,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn push_turn_evicts_oldest_beyond_cap() {
        let mut ctx = OrchestrationContext::new("s-1");
        for i in 0..5 {
            ctx.push_turn(turn(&format!("m-{i}")), 3);
        }
        assert_eq!(ctx.history.len(), 3);
        assert_eq!(ctx.history[0].message_id, "m-2");
        assert_eq!(ctx.history[2].message_id, "m-4");
    }

    #[test]
    fn session_id_priority_chain() {
        assert_eq!(resolve_session_id(Some("explicit"), Some("ctx"), ""), "explicit");
        assert_eq!(resolve_session_id(None, Some("ctx"), ""), "ctx");
        assert_eq!(
            resolve_session_id(None, None, "lights\nREQUEST_CONTEXT: {\"device_id\": \"kitchen-hub\"}"),
            "kitchen-hub"
        );
        // No sources at all: a generated UUID.
        let generated = resolve_session_id(None, None, "just text");
        assert_eq!(generated.len(), 36);
    }

    #[test]
    fn device_id_from_key_value_block() {
        let text = "turn it off\nREQUEST_CONTEXT: device_id=living-room, user=kay";
        assert_eq!(extract_device_id(text).as_deref(), Some("living-room"));
    }

    #[test]
    fn malformed_request_context_is_ignored() {
        assert_eq!(extract_device_id("REQUEST_CONTEXT: {broken"), None);
        assert_eq!(extract_device_id("no block here"), None);
        assert_eq!(extract_device_id("REQUEST_CONTEXT: user=kay"), None);
    }

    #[test]
    fn record_round_trips_context() {
        let mut ctx = OrchestrationContext::new("s-1");
        ctx.task_id = Some("t-1".to_string());
        ctx.push_turn(turn("m-1"), 10);
        ctx.agent_threads
            .insert("light-agent".to_string(), "thread-9".to_string());
        ctx.previous_agent_id = Some("light-agent".to_string());
        ctx.state_bag
            .insert("completed".to_string(), serde_json::Value::Bool(true));

        let record = TaskPersistenceRecord::encode("t-1", &ctx, Duration::from_secs(60)).unwrap();
        let decoded = record.decode().unwrap();
        assert_eq!(decoded, ctx);
        assert!(!record.is_expired());
    }

    #[test]
    fn expired_record_detection() {
        let ctx = OrchestrationContext::new("s-1");
        let mut record = TaskPersistenceRecord::encode("t-1", &ctx, Duration::from_secs(60)).unwrap();
        record.expires_at_utc = (chrono::Utc::now() - chrono::Duration::seconds(5)).to_rfc3339();
        assert!(record.is_expired());
    }
}
