//! Shared test utilities: scripted chat clients, scripted agents, and an
//! orchestrator/server fixture.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use lucia_orchestrator::prelude::*;

/// Chat client that replays a scripted sequence of completions.
pub struct ScriptedChatClient {
    responses: Mutex<VecDeque<OrchestratorResult<String>>>,
}

impl ScriptedChatClient {
    pub fn new(responses: Vec<OrchestratorResult<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    /// A client whose every completion is the same routing JSON.
    pub fn repeating(response: &str) -> Self {
        Self::new(vec![Ok(response.to_string()); 8])
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn complete(&self, _request: ChatRequest) -> OrchestratorResult<String> {
        let mut responses = self.responses.lock().await;
        responses
            .pop_front()
            .unwrap_or_else(|| Err(OrchestratorError::dependency("script exhausted")))
    }
}

/// What a scripted agent does when invoked.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Reply with the given text.
    Reply(String),
    /// Ask a clarifying question.
    NeedsInput(String),
    /// Fail with the given error message.
    Fail(String),
    /// Sleep for the duration, then reply.
    Sleep(Duration, String),
}

/// In-process agent driven by a [`Behavior`].
pub struct ScriptedAgent {
    card: AgentCard,
    behavior: Behavior,
}

impl ScriptedAgent {
    pub fn new(id: &str, behavior: Behavior) -> Self {
        Self {
            card: AgentCard::new(id, id, format!("scripted agent {id}"), "local"),
            behavior,
        }
    }
}

#[async_trait]
impl LocalAgent for ScriptedAgent {
    fn card(&self) -> AgentCard {
        self.card.clone()
    }

    async fn invoke(
        &self,
        _instruction: &str,
        _thread: &str,
        _cancel: &CancellationToken,
    ) -> OrchestratorResult<AgentReply> {
        match &self.behavior {
            Behavior::Reply(text) => Ok(AgentReply::text(text.clone())),
            Behavior::NeedsInput(text) => Ok(AgentReply::needs_input(text.clone())),
            Behavior::Fail(error) => Err(OrchestratorError::dependency(error.clone())),
            Behavior::Sleep(duration, text) => {
                tokio::time::sleep(*duration).await;
                Ok(AgentReply::text(text.clone()))
            }
        }
    }
}

/// Routing JSON the scripted chat client hands to the router.
pub fn routing_json(primary: &str, additional: &[(&str, &str)], confidence: f64) -> String {
    let additional_ids: Vec<&str> = additional.iter().map(|(id, _)| *id).collect();
    let mut instructions = serde_json::Map::new();
    for (id, instruction) in additional {
        instructions.insert(
            id.to_string(),
            serde_json::Value::String(instruction.to_string()),
        );
    }
    serde_json::json!({
        "agentId": primary,
        "additionalAgents": additional_ids,
        "instructions": instructions,
        "confidence": confidence,
        "reasoning": "scripted"
    })
    .to_string()
}

/// Test config: short timeouts, in-memory everything.
pub fn test_config() -> OrchestrationConfig {
    let mut config = OrchestrationConfig::default();
    config.agent_timeout = Duration::from_millis(500);
    config
}

/// Build an orchestrator over scripted agents and a scripted chat client.
pub async fn build_orchestrator(
    config: OrchestrationConfig,
    chat: Arc<dyn ChatClient>,
    agents: Vec<ScriptedAgent>,
) -> Arc<LuciaOrchestrator> {
    let registry = Arc::new(AgentRegistry::new());
    for agent in agents {
        registry
            .register_local(Arc::new(agent), Arc::new(UuidSessionFactory))
            .await;
    }
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    Arc::new(LuciaOrchestrator::new(config, registry, chat, store))
}

/// Bind the orchestrator's HTTP surface on an ephemeral port.
pub async fn start_test_server(
    orchestrator: Arc<LuciaOrchestrator>,
) -> (String, tokio::task::JoinHandle<()>) {
    let card = orchestrator_card(&orchestrator, "http://test.local").await;
    let app = orchestrator_router(orchestrator, card);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), handle)
}

/// A `message/send` JSON-RPC request body.
pub fn message_send_request(id: i64, text: &str, context_id: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "message/send",
        "params": {
            "message": {
                "kind": "message",
                "role": "user",
                "parts": [{"kind": "text", "text": text}],
                "messageId": uuid_v4(),
                "contextId": context_id
            }
        }
    })
}

/// A fresh UUID string.
pub fn uuid_v4() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    // Cheap unique id for tests; real UUIDs are not required here.
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test-{nanos}")
}
