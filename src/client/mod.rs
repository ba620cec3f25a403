//! Outbound A2A — how the orchestrator reaches remote agents.
//!
//! - [`A2aClient`] — `message/send` over JSON-RPC 2.0 HTTP POST
//! - [`CardResolver`] — agent card discovery from `/.well-known/agent.json`

mod a2a_client;
mod card_resolver;

pub use a2a_client::A2aClient;
pub use card_resolver::CardResolver;
