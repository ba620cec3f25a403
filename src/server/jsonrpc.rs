//! JSON-RPC 2.0 dispatch for `POST /a2a/{agentId}/v1`.
//!
//! The body is parsed by hand so malformed JSON maps to -32700 and envelope
//! violations to -32600, before any params validation. Only `message/send`
//! executes the workflow; the reserved methods answer with their designated
//! error codes until implemented.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::OrchestratorError;
use crate::orchestrator::OrchestratorRequest;
use crate::types::{JsonRpcId, JsonRpcResponse, Message, Part, Role};

use super::AppState;

/// Main JSON-RPC dispatch handler.
pub async fn handle_jsonrpc(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    body: String,
) -> Response {
    let raw: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            return rpc_error(
                None,
                OrchestratorError::parse_error(format!("invalid JSON body: {e}")),
            );
        }
    };

    let id = parse_id(&raw);

    let Some(envelope) = raw.as_object() else {
        return rpc_error(
            id,
            OrchestratorError::invalid_request("request must be a JSON object"),
        );
    };
    if envelope.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return rpc_error(
            id,
            OrchestratorError::invalid_request("missing or invalid 'jsonrpc' — must be \"2.0\""),
        );
    }
    let Some(method) = envelope.get("method").and_then(Value::as_str) else {
        return rpc_error(
            id,
            OrchestratorError::invalid_request("missing 'method'"),
        );
    };

    if agent_id != state.card.id {
        warn!(agent_id = %agent_id, "JSON-RPC request for unknown agent");
        return rpc_error(
            id,
            OrchestratorError::method_not_found(format!("unknown agent '{agent_id}'")),
        );
    }

    debug!(method, "JSON-RPC request received");
    let params = envelope.get("params").cloned().unwrap_or(Value::Null);

    match method {
        "message/send" => handle_message_send(state, id, params).await,
        "message/stream" => rpc_error(
            id,
            OrchestratorError::unsupported_operation("message/stream is not supported"),
        ),
        "tasks/get" => {
            let task_id = params
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<missing id>");
            rpc_error(id, OrchestratorError::task_not_found(task_id.to_string()))
        }
        "tasks/cancel" => {
            let task_id = params
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<missing id>");
            rpc_error(
                id,
                OrchestratorError::task_not_cancelable(format!(
                    "task {task_id} cannot be canceled"
                )),
            )
        }
        method => {
            warn!(method, "unknown JSON-RPC method");
            rpc_error(
                id,
                OrchestratorError::method_not_found(format!("method not found: {method}")),
            )
        }
    }
}

/// Handle `message/send` — the one method that runs the workflow.
async fn handle_message_send(
    state: Arc<AppState>,
    id: Option<JsonRpcId>,
    params: Value,
) -> Response {
    let message = match parse_message(&params) {
        Ok(message) => message,
        Err(e) => return rpc_error(id, e),
    };

    let request = OrchestratorRequest {
        text: message.text_content("\n"),
        message_id: Some(message.message_id.clone()),
        context_id: message.context_id.clone(),
        task_id: message.task_id.clone(),
        session_id: None,
    };

    // Dropping the connection drops this future; the guard propagates that
    // into the workflow as caller cancellation.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state.orchestrator.process_request(request, cancel).await {
        Ok(reply) => {
            let mut response = Message::assistant(uuid::Uuid::new_v4().to_string(), reply.text);
            response.context_id = message.context_id.clone();
            response.metadata = Some(serde_json::json!({
                "agents_used": reply.agents_used,
                "execution_time_ms": reply.execution_time_ms,
                "task_state": reply.task_state,
            }));
            match serde_json::to_value(&response) {
                Ok(value) => Json(JsonRpcResponse::success(id, value)).into_response(),
                Err(e) => rpc_error(
                    id,
                    OrchestratorError::internal_error(format!("serialize response: {e}")),
                ),
            }
        }
        Err(e) => rpc_error(id, e),
    }
}

/// Validate `params.message` per the wire contract.
fn parse_message(params: &Value) -> Result<Message, OrchestratorError> {
    let Some(params) = params.as_object() else {
        return Err(OrchestratorError::invalid_params("params must be an object"));
    };
    let Some(raw_message) = params.get("message") else {
        return Err(OrchestratorError::invalid_params("missing 'message'"));
    };
    let message: Message = serde_json::from_value(raw_message.clone())
        .map_err(|e| OrchestratorError::invalid_params(format!("invalid message: {e}")))?;

    if message.parts.is_empty() {
        return Err(OrchestratorError::invalid_params("message has no parts"));
    }
    if !message.parts.iter().any(|p| matches!(p, Part::Text { .. })) {
        return Err(OrchestratorError::invalid_params(
            "message has no text part",
        ));
    }
    if message.role != Role::User && message.role != Role::Assistant {
        return Err(OrchestratorError::invalid_params(format!(
            "unexpected message role '{}'",
            message.role
        )));
    }
    Ok(message)
}

fn parse_id(raw: &Value) -> Option<JsonRpcId> {
    match raw.get("id") {
        Some(Value::String(s)) => Some(JsonRpcId::String(s.clone())),
        Some(Value::Number(n)) => n.as_i64().map(JsonRpcId::Number),
        Some(Value::Null) => Some(JsonRpcId::Null),
        _ => None,
    }
}

fn rpc_error(id: Option<JsonRpcId>, err: OrchestratorError) -> Response {
    Json(JsonRpcResponse::from_orchestrator_error(id, err)).into_response()
}
