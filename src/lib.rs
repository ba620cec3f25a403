//! # lucia-orchestrator — multi-agent orchestration core for Lucia
//!
//! Lucia is a privacy-first, self-hosted assistant that answers
//! natural-language home-automation requests by routing them through a pool
//! of specialized agents. This crate is the orchestration pipeline: one user
//! utterance becomes a routing decision over the agent registry, a fan-out
//! to the selected agents (in-process or remote over the A2A protocol), and
//! a single aggregated reply, with task state persisted for multi-turn
//! continuity and resumption after restart.
//!
//! ## Pipeline
//!
//! ```text
//! message/send ─► LuciaOrchestrator ─► RouterExecutor ─► AgentChoice
//!                       │                                    │
//!                       │             ┌── AgentExecutorWrapper (local) ──┐
//!                       ├─ fan-out ──►│                                  ├─► ResultAggregator ─► reply
//!                       │             └── AgentExecutorWrapper (remote) ─┘
//!                       └─ OrchestrationContext ◄──► TaskStore (Redis)
//! ```
//!
//! - [`registry::AgentRegistry`] holds [`types::AgentCard`]s and resolves an
//!   id to a local or remote [`registry::Invoker`]
//! - [`router::RouterExecutor`] asks a chat model for an
//!   [`router::AgentChoice`] with per-agent sub-instructions
//! - [`executor::AgentExecutorWrapper`] invokes one agent under timeout and
//!   cancellation, normalizing everything into an
//!   [`executor::AgentResponse`]
//! - [`aggregator::ResultAggregator`] merges responses deterministically in
//!   router order
//! - [`orchestrator::LuciaOrchestrator`] wires the graph and owns
//!   per-request [`context::OrchestrationContext`] state
//! - [`store::TaskStore`] persists contexts by task id (Redis in
//!   production, in-memory for tests) under an etag CAS
//! - [`events::ActivityChannel`] carries [`events::LiveEvent`]s to the SSE
//!   feed and registered observers
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lucia_orchestrator::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OrchestrationConfig::from_env();
//!     let chat: Arc<dyn ChatClient> = Arc::new(OpenAiChatClient::new());
//!
//!     let registry = Arc::new(AgentRegistry::new());
//!     registry
//!         .register_local(
//!             Arc::new(GeneralAssistantAgent::new(Arc::clone(&chat), &config.router_model)),
//!             Arc::new(AssistantSessionFactory),
//!         )
//!         .await;
//!
//!     let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
//!     let orchestrator = Arc::new(LuciaOrchestrator::new(config, registry, chat, store));
//!
//!     let card = orchestrator_card(&orchestrator, "http://localhost:7420").await;
//!     let app = orchestrator_router(Arc::clone(&orchestrator), card);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:7420").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod aggregator;
pub mod chat;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod registry;
pub mod router;
pub mod server;
pub mod store;
pub mod types;

/// Prelude module that re-exports the types most hosts need.
pub mod prelude {
    pub use crate::agents::{AssistantSessionFactory, GeneralAssistantAgent};
    pub use crate::aggregator::{AggregationResult, ResultAggregator};
    pub use crate::chat::{ChatClient, ChatMessage, ChatRequest, ChatRole, OpenAiChatClient};
    pub use crate::config::{LowConfidenceAction, OrchestrationConfig};
    pub use crate::context::{ConversationTurn, OrchestrationContext, TaskPersistenceRecord};
    pub use crate::error::{OrchestratorError, OrchestratorResult};
    pub use crate::events::{ActivityChannel, LiveEvent, LiveEventType, OrchestratorObserver};
    pub use crate::executor::{AgentExecutorWrapper, AgentResponse};
    pub use crate::orchestrator::{
        LuciaOrchestrator, OrchestratorReply, OrchestratorRequest, TaskStateLabel,
    };
    pub use crate::registry::{
        AgentRegistry, AgentReply, Invoker, LocalAgent, SessionFactory, UuidSessionFactory,
    };
    pub use crate::router::{AgentChoice, ExecutionMode, RouterExecutor};
    pub use crate::server::{orchestrator_card, orchestrator_router};
    pub use crate::store::{InMemoryTaskStore, RedisTaskStore, TaskStore};
    pub use crate::types::{AgentCard, Message, Part, Role, Task, TaskState};
}

pub use error::{OrchestratorError, OrchestratorResult};
pub use types::AgentCard;
