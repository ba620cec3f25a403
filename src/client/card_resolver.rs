//! Agent card discovery.
//!
//! Remote agents publish their card at the well-known URI; the registry API
//! resolves a base URL to a card before registering it.

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::AgentCard;

/// Well-known path for agent card discovery.
const AGENT_CARD_PATH: &str = "/.well-known/agent.json";

/// Resolves [`AgentCard`]s from agent base URLs.
#[derive(Debug, Clone)]
pub struct CardResolver {
    client: reqwest::Client,
}

impl CardResolver {
    /// Create a new resolver with default settings.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a new resolver with an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch and parse the agent card from the given base URL.
    ///
    /// The fetched card's `url` is rewritten to the base URL it was resolved
    /// from, so later dispatch targets the host that actually answered.
    pub async fn resolve(&self, base_url: &str) -> OrchestratorResult<AgentCard> {
        let base = base_url.trim_end_matches('/');
        let url = format!("{base}{AGENT_CARD_PATH}");

        tracing::debug!(url = %url, "resolving agent card");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OrchestratorError::Timeout(format!(
                        "agent host {base} took too long to serve its card: {e}"
                    ))
                } else {
                    OrchestratorError::Transport(format!(
                        "agent host {base} is unreachable, card not resolved: {e}"
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

        let mut card: AgentCard = response.json().await.map_err(|e| {
            OrchestratorError::InvalidJson(format!(
                "{url} did not serve a parseable agent card: {e}"
            ))
        })?;
        card.url = base.to_string();

        tracing::debug!(agent_id = %card.id, version = %card.version, "resolved agent card");

        Ok(card)
    }
}

impl Default for CardResolver {
    fn default() -> Self {
        Self::new()
    }
}
