//! Live-activity events and the channel that carries them.
//!
//! Every lifecycle transition in the pipeline emits a [`LiveEvent`]. Events
//! flow into a bounded broadcast channel consumed by the `/api/activity/live`
//! SSE endpoint and into any registered [`OrchestratorObserver`]s. Publishing
//! never blocks; a subscriber that falls behind loses the oldest events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;

/// Bounded capacity of the activity channel.
const CHANNEL_CAPACITY: usize = 100;

/// Retained routing decisions for the diagnostics endpoint.
const ROUTING_LOG_CAPACITY: usize = 64;

/// Lifecycle transition kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LiveEventType {
    /// A request entered the pipeline.
    RequestStart,
    /// The router produced a choice.
    Routing,
    /// A wrapper began invoking an agent.
    AgentStart,
    /// A local agent invoked a tool.
    ToolCall,
    /// A tool invocation returned.
    ToolResult,
    /// A wrapper finished invoking an agent.
    AgentComplete,
    /// The request produced its reply envelope.
    RequestComplete,
    /// Something in the pipeline failed.
    Error,
}

/// One observability event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEvent {
    /// The lifecycle transition.
    #[serde(rename = "type")]
    pub event_type: LiveEventType,

    /// Agent involved, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,

    /// Tool involved, for `toolCall`/`toolResult`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Declared agent state string ("Processing Prompt…" etc.).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Whether the agent is reached over A2A.
    pub is_remote: bool,

    /// Router confidence, for `routing`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Elapsed milliseconds, for completions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Error text, for `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// RFC-3339 event timestamp.
    pub timestamp: String,
}

impl LiveEvent {
    fn base(event_type: LiveEventType) -> Self {
        Self {
            event_type,
            agent_name: None,
            tool_name: None,
            state: None,
            is_remote: false,
            confidence: None,
            duration_ms: None,
            error_message: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// A request entered the pipeline.
    pub fn request_start() -> Self {
        Self::base(LiveEventType::RequestStart)
    }

    /// The router selected agents with the given confidence.
    pub fn routing(primary: &str, confidence: f64) -> Self {
        let mut event = Self::base(LiveEventType::Routing);
        event.agent_name = Some(primary.to_string());
        event.confidence = Some(confidence);
        event
    }

    /// A wrapper began invoking an agent.
    pub fn agent_start(agent: &str, state: &str, is_remote: bool) -> Self {
        let mut event = Self::base(LiveEventType::AgentStart);
        event.agent_name = Some(agent.to_string());
        event.state = Some(state.to_string());
        event.is_remote = is_remote;
        event
    }

    /// A local agent invoked a tool.
    pub fn tool_call(agent: &str, tool: &str) -> Self {
        let mut event = Self::base(LiveEventType::ToolCall);
        event.agent_name = Some(agent.to_string());
        event.tool_name = Some(tool.to_string());
        event
    }

    /// A tool invocation returned.
    pub fn tool_result(agent: &str, tool: &str) -> Self {
        let mut event = Self::base(LiveEventType::ToolResult);
        event.agent_name = Some(agent.to_string());
        event.tool_name = Some(tool.to_string());
        event
    }

    /// A wrapper finished invoking an agent.
    pub fn agent_complete(agent: &str, is_remote: bool, duration_ms: u64) -> Self {
        let mut event = Self::base(LiveEventType::AgentComplete);
        event.agent_name = Some(agent.to_string());
        event.state = Some("Generating Response…".to_string());
        event.is_remote = is_remote;
        event.duration_ms = Some(duration_ms);
        event
    }

    /// The request produced its reply envelope.
    pub fn request_complete(duration_ms: u64) -> Self {
        let mut event = Self::base(LiveEventType::RequestComplete);
        event.duration_ms = Some(duration_ms);
        event
    }

    /// Something in the pipeline failed.
    pub fn error(agent: Option<&str>, message: &str) -> Self {
        let mut event = Self::base(LiveEventType::Error);
        event.agent_name = agent.map(|a| a.to_string());
        event.error_message = Some(message.to_string());
        event
    }
}

/// Observer of orchestration lifecycle events.
///
/// Implementations must not block; they run on the request path. The trace
/// repository sits behind this trait rather than being a core dependency.
pub trait OrchestratorObserver: Send + Sync {
    /// Called for every emitted event, in emission order per request.
    fn on_event(&self, event: &LiveEvent);
}

/// Bounded, non-blocking fan-out channel for [`LiveEvent`]s.
///
/// Built on a `tokio::sync::broadcast` channel: multiple producers, multiple
/// independent subscribers, and drop-oldest behavior for subscribers that
/// fall more than the capacity behind.
#[derive(Debug, Clone)]
pub struct ActivityChannel {
    tx: broadcast::Sender<LiveEvent>,
    observers: Arc<RwLock<Vec<Arc<dyn OrchestratorObserver>>>>,
}

impl std::fmt::Debug for dyn OrchestratorObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OrchestratorObserver")
    }
}

impl ActivityChannel {
    /// Create a channel with the default bounded capacity.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            observers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register an observer that sees every published event.
    pub fn register_observer(&self, observer: Arc<dyn OrchestratorObserver>) {
        let mut observers = self.observers.write().expect("observer lock poisoned");
        observers.push(observer);
    }

    /// Subscribe to the live event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers and observers.
    ///
    /// Never blocks and never fails: with no subscribers the send result is
    /// ignored, and slow subscribers observe a lag gap instead of back
    /// pressure on the publisher.
    pub fn publish(&self, event: LiveEvent) {
        {
            let observers = self.observers.read().expect("observer lock poisoned");
            for observer in observers.iter() {
                observer.on_event(&event);
            }
        }
        let _ = self.tx.send(event);
    }

    /// Number of active stream subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ActivityChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// One retained routing decision.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRecord {
    /// Truncated user message.
    pub message_summary: String,

    /// The primary agent chosen.
    pub primary: String,

    /// Additional agents in declaration order.
    pub additional: Vec<String>,

    /// Router confidence.
    pub confidence: f64,

    /// Router reasoning text.
    pub reasoning: String,

    /// Milliseconds the routing step took.
    pub elapsed_ms: u64,

    /// RFC-3339 timestamp.
    pub timestamp: String,
}

/// Ring buffer of recent routing decisions, backing the diagnostics endpoint.
#[derive(Debug, Default)]
pub struct RoutingLog {
    records: Mutex<VecDeque<RoutingRecord>>,
}

impl RoutingLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a routing decision, evicting the oldest beyond capacity.
    pub fn record(&self, record: RoutingRecord) {
        let mut records = self.records.lock().expect("routing log lock poisoned");
        if records.len() == ROUTING_LOG_CAPACITY {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Snapshot of retained records, oldest first.
    pub fn snapshot(&self) -> Vec<RoutingRecord> {
        let records = self.records.lock().expect("routing log lock poisoned");
        records.iter().cloned().collect()
    }
}
