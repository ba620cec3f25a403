//! Orchestration configuration.
//!
//! Layered lowest-to-highest: bundled defaults, then `LUCIA_*` environment
//! variables, then whatever the binary's command-line flags overlay on top.
//! The core only ever sees the resolved [`OrchestrationConfig`] value.

use std::env;
use std::time::Duration;

/// What to do when the router's confidence falls below the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowConfidenceAction {
    /// Keep the selection but ask the user a clarifying question.
    Clarify,
    /// Discard the selection and route to the fallback agent.
    Fallback,
}

impl LowConfidenceAction {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "clarify" => Some(LowConfidenceAction::Clarify),
            "fallback" => Some(LowConfidenceAction::Fallback),
            _ => None,
        }
    }
}

/// Resolved configuration for the orchestration core.
#[derive(Debug, Clone)]
pub struct OrchestrationConfig {
    /// Chat model id used by the router (and the built-in assistant).
    pub router_model: String,

    /// Degree cap for parallel agent fan-out.
    pub max_parallel_agents: usize,

    /// Below this router confidence the low-confidence action applies.
    pub routing_confidence_threshold: f64,

    /// Maximum retained conversation turns per session.
    pub max_conversation_history: usize,

    /// When false, fan-out runs sequentially unless the router says otherwise.
    pub enable_multi_agent: bool,

    /// Router parse/validation retries before `ROUTER_FAILURE`.
    pub router_max_attempts: u32,

    /// Behavior below the confidence threshold.
    pub low_confidence_action: LowConfidenceAction,

    /// Registry id of the fallback agent.
    pub fallback_agent: String,

    /// Per-agent execution timeout.
    pub agent_timeout: Duration,

    /// TTL applied to persisted task records.
    pub task_ttl: Duration,

    /// Redis connection string; `None` selects the in-memory task store.
    pub redis_url: Option<String>,

    /// Shared secret for the `/internal/orchestration` endpoints.
    pub diagnostics_token: Option<String>,

    /// Listen address for the server binary.
    pub bind_addr: String,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            router_model: "gpt-4o-mini".to_string(),
            max_parallel_agents: 3,
            routing_confidence_threshold: 0.7,
            max_conversation_history: 10,
            enable_multi_agent: true,
            router_max_attempts: 3,
            low_confidence_action: LowConfidenceAction::Clarify,
            fallback_agent: "general-assistant".to_string(),
            agent_timeout: Duration::from_secs(30),
            task_ttl: Duration::from_secs(24 * 60 * 60),
            redis_url: None,
            diagnostics_token: None,
            bind_addr: "127.0.0.1:7420".to_string(),
        }
    }
}

impl OrchestrationConfig {
    /// Defaults overlaid with `LUCIA_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning rather than failing
    /// startup; the default stays in effect.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay recognized environment variables onto this config.
    pub fn apply_env(&mut self) {
        if let Some(value) = read_env("LUCIA_ROUTER_MODEL") {
            self.router_model = value;
        }
        if let Some(value) = parse_env::<usize>("LUCIA_MAX_PARALLEL_AGENTS") {
            self.max_parallel_agents = value.max(1);
        }
        if let Some(value) = parse_env::<f64>("LUCIA_ROUTING_CONFIDENCE_THRESHOLD") {
            self.routing_confidence_threshold = value.clamp(0.0, 1.0);
        }
        if let Some(value) = parse_env::<usize>("LUCIA_MAX_CONVERSATION_HISTORY") {
            self.max_conversation_history = value;
        }
        if let Some(value) = parse_env::<bool>("LUCIA_ENABLE_MULTI_AGENT") {
            self.enable_multi_agent = value;
        }
        if let Some(value) = parse_env::<u32>("LUCIA_ROUTER_MAX_ATTEMPTS") {
            self.router_max_attempts = value.max(1);
        }
        if let Some(value) = read_env("LUCIA_LOW_CONFIDENCE_ACTION") {
            match LowConfidenceAction::parse(&value) {
                Some(action) => self.low_confidence_action = action,
                None => tracing::warn!(
                    value = %value,
                    "LUCIA_LOW_CONFIDENCE_ACTION must be 'clarify' or 'fallback'"
                ),
            }
        }
        if let Some(value) = read_env("LUCIA_FALLBACK_AGENT") {
            self.fallback_agent = value;
        }
        if let Some(secs) = parse_env::<u64>("LUCIA_AGENT_TIMEOUT_SECS") {
            self.agent_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse_env::<u64>("LUCIA_TASK_TTL_SECS") {
            self.task_ttl = Duration::from_secs(secs.max(1));
        }
        if let Some(value) = read_env("LUCIA_REDIS_URL") {
            self.redis_url = Some(value);
        }
        if let Some(value) = read_env("LUCIA_DIAGNOSTICS_TOKEN") {
            self.diagnostics_token = Some(value);
        }
        if let Some(value) = read_env("LUCIA_BIND_ADDR") {
            self.bind_addr = value;
        }
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = read_env(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key = %key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = OrchestrationConfig::default();
        assert_eq!(config.max_parallel_agents, 3);
        assert_eq!(config.routing_confidence_threshold, 0.7);
        assert_eq!(config.max_conversation_history, 10);
        assert_eq!(config.router_max_attempts, 3);
        assert_eq!(config.agent_timeout, Duration::from_secs(30));
        assert_eq!(config.task_ttl, Duration::from_secs(86400));
        assert_eq!(config.fallback_agent, "general-assistant");
    }

    #[test]
    fn low_confidence_action_parsing() {
        assert_eq!(
            LowConfidenceAction::parse("Fallback"),
            Some(LowConfidenceAction::Fallback)
        );
        assert_eq!(
            LowConfidenceAction::parse("clarify"),
            Some(LowConfidenceAction::Clarify)
        );
        assert_eq!(LowConfidenceAction::parse("shrug"), None);
    }
}
