//! Registry, diagnostics, and live-activity routes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::AppState;

/// Serve the orchestrator's card at the well-known endpoint.
pub async fn handle_agent_card(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.card.clone())
}

/// `GET /api/agents` — all registered cards in stable order.
pub async fn handle_list_agents(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cards = state.orchestrator.registry().list().await;
    Json(cards)
}

/// Body of `POST /api/agents`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentBody {
    /// Base URL of the agent to register.
    pub agent_uri: String,
}

/// `POST /api/agents` — resolve the remote card and register it.
pub async fn handle_register_agent(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterAgentBody>,
) -> Response {
    match state.resolver.resolve(&body.agent_uri).await {
        Ok(card) => {
            debug!(agent_id = %card.id, uri = %body.agent_uri, "registering remote agent");
            state.orchestrator.registry().register(card.clone()).await;
            (StatusCode::CREATED, Json(card)).into_response()
        }
        Err(e) => {
            warn!(uri = %body.agent_uri, error = %e, "failed to resolve agent card");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// `PUT /api/agents/{agentUri}` — re-resolve and replace the card.
pub async fn handle_update_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_uri): Path<String>,
) -> Response {
    match state.resolver.resolve(&agent_uri).await {
        Ok(card) => {
            state.orchestrator.registry().register(card.clone()).await;
            Json(card).into_response()
        }
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// `DELETE /api/agents/{agentUri}` — unregister by id or URL.
pub async fn handle_unregister_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_uri): Path<String>,
) -> Response {
    let registry = state.orchestrator.registry();
    let target = registry
        .list()
        .await
        .into_iter()
        .find(|card| card.id == agent_uri || card.url == agent_uri);
    match target {
        Some(card) => {
            registry.unregister(&card.id).await;
            StatusCode::NO_CONTENT.into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no agent matches '{agent_uri}'") })),
        )
            .into_response(),
    }
}

/// Shared-secret gate for the internal endpoints.
fn check_internal_auth(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.orchestrator.config().diagnostics_token.as_deref() else {
        // No token configured: internal endpoints are open (dev mode).
        return Ok(());
    };
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(expected) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "missing or invalid diagnostics token" })),
        )
            .into_response())
    }
}

/// `GET /internal/orchestration/health`.
pub async fn handle_health(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = check_internal_auth(&state, &headers) {
        return denied;
    }
    let agents = state.orchestrator.registry().list().await.len();
    Json(serde_json::json!({
        "status": "ok",
        "agents": agents,
        "activitySubscribers": state.orchestrator.activity().subscriber_count(),
    }))
    .into_response()
}

/// `GET /internal/orchestration/routing-log`.
pub async fn handle_routing_log(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = check_internal_auth(&state, &headers) {
        return denied;
    }
    Json(state.orchestrator.routing_log().snapshot()).into_response()
}

/// `GET /internal/orchestration/tasks/{taskId}` — record metadata.
pub async fn handle_task_record(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Response {
    if let Err(denied) = check_internal_auth(&state, &headers) {
        return denied;
    }
    match state.orchestrator.store().load(&task_id).await {
        Ok(Some(record)) => Json(serde_json::json!({
            "taskId": record.task_id,
            "etag": record.etag,
            "expiresAtUtc": record.expires_at_utc,
            "payloadBytes": record.context_payload.len(),
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no record for task '{task_id}'") })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// `POST /internal/orchestration/tasks/{taskId}/rehydrate` — decode the
/// stored context and report what a resume would see.
pub async fn handle_task_rehydrate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Response {
    if let Err(denied) = check_internal_auth(&state, &headers) {
        return denied;
    }
    match state.orchestrator.store().load(&task_id).await {
        Ok(Some(record)) => match record.decode() {
            Ok(context) => Json(serde_json::json!({
                "taskId": task_id,
                "sessionId": context.session_id,
                "turns": context.history.len(),
                "previousAgentId": context.previous_agent_id,
                "agentThreads": context.agent_threads.keys().collect::<Vec<_>>(),
            }))
            .into_response(),
            Err(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response(),
        },
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no record for task '{task_id}'") })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// `GET /api/activity/live` — SSE of [`LiveEvent`](crate::events::LiveEvent)
/// JSON objects, keep-alive, no buffering.
pub async fn handle_activity_live(State(state): State<Arc<AppState>>) -> Response {
    let rx = state.orchestrator.activity().subscribe();
    Sse::new(make_event_stream(rx))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn make_event_stream(
    mut rx: broadcast::Receiver<crate::events::LiveEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => yield Ok(Event::default().data(json)),
                    Err(e) => {
                        warn!(error = %e, "failed to serialize live event");
                    }
                },
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Slow subscriber: the channel dropped the oldest events.
                    warn!(missed = n, "activity subscriber lagged");
                }
            }
        }
    }
}
