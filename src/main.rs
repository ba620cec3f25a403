//! lucia-server — the orchestrator host binary.
//!
//! Wires configuration (flags over environment over defaults), the chat
//! client, the agent registry with the built-in general assistant, the task
//! store (Redis when configured, in-memory otherwise), and serves the HTTP
//! surface until ctrl-c.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lucia_orchestrator::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "lucia-server", about = "Lucia orchestration server")]
struct Args {
    /// Listen address, e.g. 127.0.0.1:7420
    #[arg(long)]
    bind: Option<String>,

    /// Chat model id for the router
    #[arg(long)]
    router_model: Option<String>,

    /// Redis connection string for task persistence
    #[arg(long)]
    redis_url: Option<String>,

    /// Degree cap for parallel agent fan-out
    #[arg(long)]
    max_parallel_agents: Option<usize>,

    /// Routing confidence threshold in [0, 1]
    #[arg(long)]
    confidence_threshold: Option<f64>,

    /// Per-agent execution timeout in seconds
    #[arg(long)]
    agent_timeout_secs: Option<u64>,

    /// Task record TTL in seconds
    #[arg(long)]
    task_ttl_secs: Option<u64>,

    /// Disable parallel multi-agent coordination
    #[arg(long)]
    sequential: bool,
}

impl Args {
    fn overlay(self, mut config: OrchestrationConfig) -> OrchestrationConfig {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(model) = self.router_model {
            config.router_model = model;
        }
        if let Some(url) = self.redis_url {
            config.redis_url = Some(url);
        }
        if let Some(cap) = self.max_parallel_agents {
            config.max_parallel_agents = cap.max(1);
        }
        if let Some(threshold) = self.confidence_threshold {
            config.routing_confidence_threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(secs) = self.agent_timeout_secs {
            config.agent_timeout = std::time::Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = self.task_ttl_secs {
            config.task_ttl = std::time::Duration::from_secs(secs.max(1));
        }
        if self.sequential {
            config.enable_multi_agent = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lucia_orchestrator=info,lucia_server=info")),
        )
        .init();

    let config = Args::parse().overlay(OrchestrationConfig::from_env());
    info!(bind = %config.bind_addr, model = %config.router_model, "starting lucia-server");

    let chat: Arc<dyn ChatClient> = Arc::new(OpenAiChatClient::new());

    let registry = Arc::new(AgentRegistry::new());
    registry
        .register_local(
            Arc::new(GeneralAssistantAgent::new(
                Arc::clone(&chat),
                config.router_model.clone(),
            )),
            Arc::new(AssistantSessionFactory),
        )
        .await;

    let store: Arc<dyn TaskStore> = match config.redis_url.as_deref() {
        Some(url) => {
            info!(url, "using redis task store");
            Arc::new(RedisTaskStore::new(url, config.task_ttl)?)
        }
        None => {
            warn!("no redis url configured; task state will not survive restarts");
            Arc::new(InMemoryTaskStore::new())
        }
    };

    let bind_addr = config.bind_addr.clone();
    let orchestrator = Arc::new(LuciaOrchestrator::new(config, registry, chat, store));

    let card = orchestrator_card(&orchestrator, &format!("http://{bind_addr}")).await;
    let app = orchestrator_router(Arc::clone(&orchestrator), card);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
