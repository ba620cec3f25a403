//! Inbound HTTP — the orchestrator's axum surface.
//!
//! - `POST /a2a/{agentId}/v1` — JSON-RPC 2.0 endpoint ([`jsonrpc`])
//! - `GET /.well-known/agent.json` — orchestrator card discovery
//! - `/api/agents` — registry management ([`api`])
//! - `/internal/orchestration/*` — diagnostics, shared-secret gated
//! - `GET /api/activity/live` — live-activity SSE

mod api;
mod jsonrpc;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::client::CardResolver;
use crate::orchestrator::LuciaOrchestrator;
use crate::types::AgentCard;

/// Shared state for the axum routes.
pub struct AppState {
    /// The orchestration core.
    pub orchestrator: Arc<LuciaOrchestrator>,
    /// The orchestrator's own agent card.
    pub card: AgentCard,
    /// Resolver for remote cards registered through the API.
    pub resolver: CardResolver,
}

/// Build the orchestrator's own card from its registered agents.
///
/// The capability set is the union of the registered agents' tags, so the
/// served card reflects what the deployment can actually do.
pub async fn orchestrator_card(orchestrator: &LuciaOrchestrator, base_url: &str) -> AgentCard {
    let mut card = AgentCard::new(
        "lucia",
        "Lucia",
        "Privacy-first home assistant orchestrator. Routes natural-language requests to \
         specialized agents.",
        base_url,
    );
    for agent in orchestrator.registry().list().await {
        for capability in agent.capabilities {
            if !card.capabilities.contains(&capability) {
                card.capabilities.push(capability);
            }
        }
    }
    card
}

/// Create the axum `Router` with all orchestrator routes.
pub fn orchestrator_router(orchestrator: Arc<LuciaOrchestrator>, card: AgentCard) -> Router {
    let state = Arc::new(AppState {
        orchestrator,
        card,
        resolver: CardResolver::new(),
    });

    Router::new()
        .route("/.well-known/agent.json", get(api::handle_agent_card))
        .route("/a2a/{agent_id}/v1", post(jsonrpc::handle_jsonrpc))
        .route("/api/agents", get(api::handle_list_agents))
        .route("/api/agents", post(api::handle_register_agent))
        .route("/api/agents/{agent_uri}", put(api::handle_update_agent))
        .route("/api/agents/{agent_uri}", delete(api::handle_unregister_agent))
        .route("/api/activity/live", get(api::handle_activity_live))
        .route(
            "/internal/orchestration/health",
            get(api::handle_health),
        )
        .route(
            "/internal/orchestration/routing-log",
            get(api::handle_routing_log),
        )
        .route(
            "/internal/orchestration/tasks/{task_id}",
            get(api::handle_task_record),
        )
        .route(
            "/internal/orchestration/tasks/{task_id}/rehydrate",
            post(api::handle_task_rehydrate),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
