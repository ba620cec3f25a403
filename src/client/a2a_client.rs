//! Typed client for remote A2A agents.
//!
//! The orchestrator only consumes `message/send`; the reserved methods it
//! answers on its own endpoint are never dispatched outward. Dispatch is a
//! single JSON-RPC POST per invocation, so the client is just a `reqwest`
//! handle bound to one agent endpoint.

use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::{JsonRpcRequest, JsonRpcResponse, MessageSendParams, SendMessageResponse};

/// Ceiling on one remote dispatch at the HTTP layer. The executor wrapper's
/// per-agent timeout is the one that actually governs; this only stops a
/// wedged connection from outliving the request.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for one remote A2A agent endpoint.
pub struct A2aClient {
    http: reqwest::Client,
    endpoint: String,
}

impl std::fmt::Debug for A2aClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("A2aClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl A2aClient {
    /// Create a client for an agent given its card URL and id.
    ///
    /// A card URL that already names the versioned JSON-RPC endpoint is used
    /// as-is; a bare base URL gets the canonical `/a2a/{agentId}/v1` path
    /// appended.
    pub fn for_agent(url: &str, agent_id: &str) -> Self {
        Self::from_endpoint(endpoint_for(url, agent_id))
    }

    /// Create a client from a direct endpoint URL.
    pub fn from_endpoint(endpoint: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DISPATCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Send a message to the agent (`message/send`).
    pub async fn send_message(
        &self,
        params: MessageSendParams,
    ) -> OrchestratorResult<SendMessageResponse> {
        let request = build_request("message/send", &params)?;
        let response = self.post(&request).await?;
        parse_result(response)
    }

    /// One JSON-RPC round trip to the agent endpoint.
    async fn post(&self, request: &JsonRpcRequest) -> OrchestratorResult<JsonRpcResponse> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OrchestratorError::Timeout(format!(
                        "remote agent at {} did not answer in time: {e}",
                        self.endpoint
                    ))
                } else {
                    OrchestratorError::Transport(format!(
                        "could not dispatch to remote agent at {}: {e}",
                        self.endpoint
                    ))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<JsonRpcResponse>().await.map_err(|e| {
            OrchestratorError::InvalidJson(format!(
                "remote agent at {} answered with something other than JSON-RPC: {e}",
                self.endpoint
            ))
        })
    }
}

/// Compute the JSON-RPC endpoint for an agent URL.
fn endpoint_for(url: &str, agent_id: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/a2a/{agent_id}/v1")
    }
}

fn build_request<P: Serialize>(method: &str, params: &P) -> OrchestratorResult<JsonRpcRequest> {
    let value = serde_json::to_value(params).map_err(|e| {
        OrchestratorError::Transport(format!("unserializable {method} params: {e}"))
    })?;
    Ok(JsonRpcRequest::new(
        Uuid::new_v4().to_string(),
        method,
        Some(value),
    ))
}

fn parse_result(response: JsonRpcResponse) -> OrchestratorResult<SendMessageResponse> {
    if let Some(error) = response.error {
        return Err(OrchestratorError::JsonRpc {
            code: error.code,
            message: error.message,
            data: error.data,
        });
    }
    let result = response.result.ok_or_else(|| {
        OrchestratorError::InvalidJson("response carried neither result nor error".to_string())
    })?;
    serde_json::from_value(result)
        .map_err(|e| OrchestratorError::InvalidJson(format!("unrecognized result shape: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_canonical_path() {
        assert_eq!(
            endpoint_for("http://host:9000", "timer-agent"),
            "http://host:9000/a2a/timer-agent/v1"
        );
        assert_eq!(
            endpoint_for("http://host:9000/", "timer-agent"),
            "http://host:9000/a2a/timer-agent/v1"
        );
    }

    #[test]
    fn endpoint_keeps_versioned_url() {
        assert_eq!(
            endpoint_for("http://host:9000/a2a/timer-agent/v1", "timer-agent"),
            "http://host:9000/a2a/timer-agent/v1"
        );
    }

    #[test]
    fn json_rpc_error_surfaces_as_error() {
        let response = JsonRpcResponse::error(
            None,
            crate::types::JsonRpcError {
                code: -32001,
                message: "Task not found".to_string(),
                data: None,
            },
        );
        let err = parse_result(response).unwrap_err();
        match err {
            OrchestratorError::JsonRpc { code, .. } => assert_eq!(code, -32001),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
