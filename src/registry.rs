//! Agent registry — the single source of truth for what agents exist.
//!
//! Cards are registered at startup (in-process plugins) or through the
//! registry API (remote agents discovered by card resolution). Readers take
//! a [`RegistrySnapshot`] at request start; registration changes never affect
//! an in-flight request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::AgentCard;

/// A tool invocation captured from a local agent's execution record.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolTrace {
    /// Name of the tool the agent called.
    pub tool_name: String,

    /// Short rendering of the arguments, for observability only.
    pub arguments: Option<String>,

    /// Short rendering of the result, for observability only.
    pub result: Option<String>,
}

/// What a local agent hands back from one invocation.
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    /// The reply text.
    pub text: String,

    /// True when the agent is asking a clarifying question.
    pub needs_input: bool,

    /// Tool calls made during the invocation, in call order.
    pub tool_calls: Vec<ToolTrace>,
}

impl AgentReply {
    /// A plain text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// A clarifying question back to the user.
    pub fn needs_input(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            needs_input: true,
            tool_calls: Vec::new(),
        }
    }
}

/// Capability set every in-process agent provides.
///
/// Local, remote-proxied, and user-defined agents are all tagged invokers
/// behind this interface; there is no base-class hierarchy.
#[async_trait]
pub trait LocalAgent: Send + Sync {
    /// The agent's card.
    fn card(&self) -> AgentCard;

    /// One-time startup hook, called at registration.
    async fn initialize(&self) -> OrchestratorResult<()> {
        Ok(())
    }

    /// Invoke the agent with a focused sub-instruction.
    ///
    /// `thread` is the opaque handle produced by this agent's
    /// [`SessionFactory`]; the agent owns whatever state hangs off it.
    async fn invoke(
        &self,
        instruction: &str,
        thread: &str,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<AgentReply>;

    /// Re-read any external configuration the agent depends on.
    async fn refresh_config(&self) -> OrchestratorResult<()> {
        Ok(())
    }
}

/// Creates conversation threads for one agent.
///
/// Supplied explicitly at registration; the handle it returns is persisted in
/// `OrchestrationContext.agent_threads` and passed back on later turns.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Create a new thread handle for the given session.
    async fn create_thread(&self, session_id: &str) -> OrchestratorResult<String>;
}

/// Session factory that mints a fresh UUID-suffixed handle per session.
pub struct UuidSessionFactory;

#[async_trait]
impl SessionFactory for UuidSessionFactory {
    async fn create_thread(&self, session_id: &str) -> OrchestratorResult<String> {
        Ok(format!("{}:{}", session_id, uuid::Uuid::new_v4()))
    }
}

/// An in-process registration: the agent plus its session factory.
#[derive(Clone)]
pub struct LocalRegistration {
    /// The agent implementation.
    pub agent: Arc<dyn LocalAgent>,

    /// Its session factory.
    pub sessions: Arc<dyn SessionFactory>,
}

/// The behavior of calling one agent, resolved from a card.
///
/// Resolution prefers the local implementation when one was registered;
/// otherwise the card's URL names a remote A2A endpoint.
#[derive(Clone)]
pub enum Invoker {
    // Variants hold `Arc<dyn LocalAgent>` / `Arc<dyn SessionFactory>`, which
    // aren't `Debug`, so `Debug` is implemented manually below.
    /// In-process invocation.
    Local {
        /// The registered agent.
        agent: Arc<dyn LocalAgent>,
        /// Its session factory.
        sessions: Arc<dyn SessionFactory>,
    },
    /// Remote invocation over A2A JSON-RPC.
    Remote {
        /// The card whose URL the dispatch binds to.
        card: AgentCard,
    },
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Invoker::Local { .. } => f.debug_struct("Invoker::Local").finish_non_exhaustive(),
            Invoker::Remote { card } => f
                .debug_struct("Invoker::Remote")
                .field("card", card)
                .finish(),
        }
    }
}

impl Invoker {
    /// Whether this invoker dispatches over A2A.
    pub fn is_remote(&self) -> bool {
        matches!(self, Invoker::Remote { .. })
    }

    /// The resolution source name used in observability output.
    pub fn source(&self) -> &'static str {
        match self {
            Invoker::Local { .. } => "local",
            Invoker::Remote { .. } => "a2a",
        }
    }
}

struct RegistryEntry {
    card: AgentCard,
    local: Option<LocalRegistration>,
}

/// Registry of agent cards with optional in-process implementations.
///
/// `register*` is idempotent: re-registering an id replaces the previous
/// entry but keeps its position in the listing order, so routing prompts
/// stay reproducible across re-registration.
#[derive(Default)]
pub struct AgentRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
    order: RwLock<Vec<String>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a remote agent by card.
    pub async fn register(&self, card: AgentCard) {
        self.insert(card, None).await;
    }

    /// Register an in-process agent with its session factory.
    ///
    /// The card comes from the agent itself; `initialize` has already run
    /// (or will run) under the host's startup sequence.
    pub async fn register_local(&self, agent: Arc<dyn LocalAgent>, sessions: Arc<dyn SessionFactory>) {
        let card = agent.card();
        self.insert(card, Some(LocalRegistration { agent, sessions }))
            .await;
    }

    async fn insert(&self, card: AgentCard, local: Option<LocalRegistration>) {
        let id = card.id.clone();
        let mut entries = self.entries.write().await;
        let replaced = entries
            .insert(id.clone(), RegistryEntry { card, local })
            .is_some();
        if !replaced {
            let mut order = self.order.write().await;
            order.push(id.clone());
        }
        debug!(agent_id = %id, replaced, "agent registered");
    }

    /// Remove an agent. Silently succeeds when the id is unknown.
    pub async fn unregister(&self, id: &str) {
        let mut entries = self.entries.write().await;
        if entries.remove(id).is_some() {
            let mut order = self.order.write().await;
            order.retain(|entry| entry != id);
            debug!(agent_id = %id, "agent unregistered");
        }
    }

    /// Look up a card by id.
    pub async fn get(&self, id: &str) -> Option<AgentCard> {
        let entries = self.entries.read().await;
        entries.get(id).map(|e| e.card.clone())
    }

    /// All cards in stable insertion order.
    pub async fn list(&self) -> Vec<AgentCard> {
        let entries = self.entries.read().await;
        let order = self.order.read().await;
        order
            .iter()
            .filter_map(|id| entries.get(id).map(|e| e.card.clone()))
            .collect()
    }

    /// Cards carrying the given capability tag, in insertion order.
    pub async fn find_by_capability(&self, tag: &str) -> Vec<AgentCard> {
        self.list()
            .await
            .into_iter()
            .filter(|card| card.capabilities.iter().any(|c| c == tag))
            .collect()
    }

    /// Consistent copy of the registry for one request.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        let entries = self.entries.read().await;
        let order = self.order.read().await;
        let cards = order
            .iter()
            .filter_map(|id| entries.get(id).map(|e| e.card.clone()))
            .collect();
        let locals = entries
            .iter()
            .filter_map(|(id, entry)| {
                entry
                    .local
                    .as_ref()
                    .map(|local| (id.clone(), local.clone()))
            })
            .collect();
        RegistrySnapshot { cards, locals }
    }
}

/// Immutable view of the registry captured at request start.
#[derive(Clone)]
pub struct RegistrySnapshot {
    cards: Vec<AgentCard>,
    locals: HashMap<String, LocalRegistration>,
}

impl RegistrySnapshot {
    /// Cards in stable insertion order.
    pub fn cards(&self) -> &[AgentCard] {
        &self.cards
    }

    /// Whether an id resolves in this snapshot.
    pub fn contains(&self, id: &str) -> bool {
        self.cards.iter().any(|card| card.id == id)
    }

    /// Look up a card by id.
    pub fn card(&self, id: &str) -> Option<&AgentCard> {
        self.cards.iter().find(|card| card.id == id)
    }

    /// Resolve an id to its invoker, preferring the local implementation.
    pub fn resolve_invoker(&self, id: &str) -> OrchestratorResult<Invoker> {
        let card = self
            .card(id)
            .ok_or_else(|| OrchestratorError::UnknownAgent {
                agent_id: id.to_string(),
            })?;

        let invoker = match self.locals.get(id) {
            Some(local) => Invoker::Local {
                agent: Arc::clone(&local.agent),
                sessions: Arc::clone(&local.sessions),
            },
            None => Invoker::Remote { card: card.clone() },
        };
        debug!(agent_id = %id, source = invoker.source(), "resolved agent invoker");
        Ok(invoker)
    }
}
