//! Remote A2A dispatch against a stub agent server.

mod common;

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use common::{routing_json, test_config, ScriptedChatClient};
use lucia_orchestrator::prelude::*;
use tokio_util::sync::CancellationToken;

/// Bind a stub A2A agent that answers every `message/send` with the given
/// JSON-RPC `result` payload.
async fn start_stub_agent(result: serde_json::Value) -> (String, tokio::task::JoinHandle<()>) {
    async fn handle(
        State(result): State<Arc<serde_json::Value>>,
        body: String,
    ) -> Json<serde_json::Value> {
        let request: serde_json::Value = serde_json::from_str(&body).unwrap();
        Json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": *result
        }))
    }

    let app = Router::new()
        .route("/a2a/{agent_id}/v1", post(handle))
        .with_state(Arc::new(result));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), handle)
}

fn completed_task_result(text: &str) -> serde_json::Value {
    serde_json::json!({
        "kind": "task",
        "id": "remote-task-1",
        "contextId": "C-remote",
        "status": { "state": "completed" },
        "history": [
            {
                "kind": "message",
                "messageId": "rm-1",
                "role": "user",
                "parts": [{"kind": "text", "text": "set a reminder"}]
            },
            {
                "kind": "message",
                "messageId": "rm-2",
                "role": "agent",
                "parts": [{"kind": "text", "text": text}]
            }
        ]
    })
}

async fn orchestrator_with_remote(
    card_url: &str,
) -> Arc<LuciaOrchestrator> {
    let chat = Arc::new(ScriptedChatClient::repeating(&routing_json(
        "timer-agent",
        &[("timer-agent", "Set a reminder for 10 minutes")],
        0.9,
    )));
    let registry = Arc::new(AgentRegistry::new());
    registry
        .register(
            AgentCard::new("timer-agent", "Timers", "Schedules timers and reminders", card_url)
                .with_capability("scheduling"),
        )
        .await;
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    Arc::new(LuciaOrchestrator::new(test_config(), registry, chat, store))
}

fn task_request(text: &str, task_id: &str) -> OrchestratorRequest {
    OrchestratorRequest {
        text: text.to_string(),
        message_id: Some(common::uuid_v4()),
        context_id: Some("C-remote".to_string()),
        task_id: Some(task_id.to_string()),
        session_id: None,
    }
}

#[tokio::test]
async fn remote_completed_task_becomes_the_reply() {
    let (stub_url, _stub) =
        start_stub_agent(completed_task_result("Reminder set for 10 minutes.")).await;
    let orchestrator = orchestrator_with_remote(&stub_url).await;

    let reply = orchestrator
        .process_request(task_request("Set a reminder", "T-remote"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reply.text, "Reminder set for 10 minutes.");
    assert_eq!(reply.agents_used, vec!["timer-agent"]);
    assert_eq!(reply.task_state, TaskStateLabel::Fresh);

    // The resumed turn reports "resumed".
    let resumed = orchestrator
        .process_request(task_request("Is it set?", "T-remote"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(resumed.task_state, TaskStateLabel::Resumed);
}

#[tokio::test]
async fn remote_input_required_propagates_needs_input() {
    let (stub_url, _stub) = start_stub_agent(serde_json::json!({
        "kind": "task",
        "id": "remote-task-2",
        "contextId": "C-remote",
        "status": {
            "state": "input-required",
            "message": {
                "kind": "message",
                "messageId": "rm-3",
                "role": "agent",
                "parts": [{"kind": "text", "text": "How many minutes?"}]
            }
        }
    }))
    .await;
    let orchestrator = orchestrator_with_remote(&stub_url).await;

    let reply = orchestrator
        .process_request(task_request("Set a reminder", "T-input"), CancellationToken::new())
        .await
        .unwrap();

    assert!(reply.needs_input);
    assert!(reply.text.starts_with("How many minutes?"));
}

#[tokio::test]
async fn remote_failed_task_is_recovered_as_agent_failure() {
    let (stub_url, _stub) = start_stub_agent(serde_json::json!({
        "kind": "task",
        "id": "remote-task-3",
        "contextId": "C-remote",
        "status": { "state": "failed" }
    }))
    .await;
    let orchestrator = orchestrator_with_remote(&stub_url).await;

    let reply = orchestrator
        .process_request(task_request("Set a reminder", "T-fail"), CancellationToken::new())
        .await
        .unwrap();

    // Full failure still yields a reply, not an error.
    assert!(reply.text.contains("timer-agent"));
    assert!(reply.text.contains("failed"));
}

#[tokio::test]
async fn remote_direct_message_is_a_plain_success() {
    let (stub_url, _stub) = start_stub_agent(serde_json::json!({
        "kind": "message",
        "messageId": "rm-4",
        "role": "agent",
        "parts": [{"kind": "text", "text": "Done."}]
    }))
    .await;
    let orchestrator = orchestrator_with_remote(&stub_url).await;

    let reply = orchestrator
        .process_request(task_request("Set a reminder", "T-msg"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply.text, "Done.");
}

#[tokio::test]
async fn unreachable_remote_is_recovered_as_agent_failure() {
    // Nothing listens on this port.
    let orchestrator = orchestrator_with_remote("http://127.0.0.1:9").await;

    let reply = orchestrator
        .process_request(task_request("Set a reminder", "T-down"), CancellationToken::new())
        .await
        .unwrap();

    assert!(reply.text.starts_with("I'm sorry"));
    assert!(reply.text.contains("timer-agent"));
}
