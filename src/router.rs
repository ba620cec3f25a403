//! Router — turns one user utterance into an [`AgentChoice`].
//!
//! The router builds a catalog prompt from the registry snapshot, asks the
//! chat model for strict JSON, and retries with a corrective re-prompt when
//! the output doesn't parse. Unknown agent ids are dropped after the fact;
//! if nothing valid survives, routing falls back to the configured default
//! agent rather than failing the request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::chat::{ChatClient, ChatMessage, ChatRequest};
use crate::config::{LowConfidenceAction, OrchestrationConfig};
use crate::context::ConversationTurn;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::registry::RegistrySnapshot;

/// Character budget for the history section of the routing prompt. Turns
/// beyond it are collapsed into one-line summaries, oldest first.
const HISTORY_CHAR_BUDGET: usize = 2000;

/// How the fan-out should run, when the router expresses a preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Dispatch selected agents concurrently.
    Parallel,
    /// Dispatch selected agents one after another.
    Sequential,
}

/// The router's decision for one request.
#[derive(Debug, Clone)]
pub struct AgentChoice {
    /// Primary agent id; resolves in the request's registry snapshot.
    pub agent_id: String,

    /// Additional agents in declaration order, possibly empty.
    pub additional_agents: Vec<String>,

    /// Agent id → focused standalone sub-prompt.
    pub instructions: HashMap<String, String>,

    /// Router confidence in [0, 1].
    pub confidence: f64,

    /// Free-text reasoning, kept for observability.
    pub reasoning: String,

    /// Fan-out mode preference, when the router expressed one.
    pub mode: Option<ExecutionMode>,

    /// Set when confidence fell below the threshold and configuration says
    /// to ask the user instead of falling back.
    pub needs_clarification: bool,
}

impl AgentChoice {
    /// All selected agent ids, primary first, duplicates removed.
    pub fn selected_agents(&self) -> Vec<String> {
        let mut agents = vec![self.agent_id.clone()];
        for id in &self.additional_agents {
            if !agents.contains(id) {
                agents.push(id.clone());
            }
        }
        agents
    }

    /// The sub-instruction for an agent, or the original text when the
    /// router didn't provide one.
    pub fn instruction_for<'a>(&'a self, agent_id: &str, fallback: &'a str) -> &'a str {
        self.instructions
            .get(agent_id)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(fallback)
    }
}

/// Raw JSON shape the model is asked to produce.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChoice {
    agent_id: String,
    #[serde(default)]
    additional_agents: Vec<String>,
    #[serde(default)]
    instructions: HashMap<String, String>,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    mode: Option<String>,
}

/// Outcome of one routing run, with the elapsed time for the routing log.
#[derive(Debug, Clone)]
pub struct RoutingOutcome {
    /// The effective choice.
    pub choice: AgentChoice,
    /// Milliseconds the routing step took.
    pub elapsed_ms: u64,
}

/// The workflow step that selects agents for a request.
///
/// Stateless across requests; all state lives in the arguments.
pub struct RouterExecutor {
    chat: Arc<dyn ChatClient>,
    model: String,
    max_attempts: u32,
    confidence_threshold: f64,
    low_confidence_action: LowConfidenceAction,
    fallback_agent: String,
}

impl RouterExecutor {
    /// Create a router from the resolved configuration.
    pub fn new(chat: Arc<dyn ChatClient>, config: &OrchestrationConfig) -> Self {
        Self {
            chat,
            model: config.router_model.clone(),
            max_attempts: config.router_max_attempts.max(1),
            confidence_threshold: config.routing_confidence_threshold,
            low_confidence_action: config.low_confidence_action,
            fallback_agent: config.fallback_agent.clone(),
        }
    }

    /// Produce an [`AgentChoice`] for the user message.
    ///
    /// Always yields a choice (possibly the fallback); errors only when the
    /// model fails to produce parseable output across every attempt.
    pub async fn route(
        &self,
        user_text: &str,
        snapshot: &RegistrySnapshot,
        history: &[ConversationTurn],
    ) -> OrchestratorResult<RoutingOutcome> {
        let started = Instant::now();
        let prompt = self.build_prompt(user_text, snapshot, history);

        let mut last_failure = String::new();
        for attempt in 1..=self.max_attempts {
            let mut messages = vec![
                ChatMessage::system(prompt.clone()),
                ChatMessage::user(user_text.to_string()),
            ];
            if attempt > 1 {
                messages.push(ChatMessage::user(format!(
                    "Your previous reply was not valid ({last_failure}). \
                     Respond again with ONLY the JSON object, no prose, no code fences."
                )));
            }

            let raw = match self
                .chat
                .complete(ChatRequest {
                    model: self.model.clone(),
                    messages,
                    json_output: true,
                })
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(attempt, error = %e, "router model call failed");
                    last_failure = e.to_string();
                    continue;
                }
            };

            match parse_choice(&raw) {
                Ok(parsed) => {
                    let choice = self.validate(parsed, snapshot, user_text);
                    return Ok(RoutingOutcome {
                        choice,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "router output did not parse");
                    last_failure = e.to_string();
                }
            }
        }

        Err(OrchestratorError::router_failure(format!(
            "no valid routing choice after {} attempts: {}",
            self.max_attempts, last_failure
        )))
    }

    /// Drop unknown ids, promote a valid additional when the primary is
    /// unknown, and apply the low-confidence policy.
    fn validate(
        &self,
        raw: RawChoice,
        snapshot: &RegistrySnapshot,
        user_text: &str,
    ) -> AgentChoice {
        let confidence = raw.confidence.clamp(0.0, 1.0);
        let mode = match raw.mode.as_deref() {
            Some("parallel") => Some(ExecutionMode::Parallel),
            Some("sequential") => Some(ExecutionMode::Sequential),
            Some(other) => {
                warn!(mode = %other, "router suggested unknown execution mode");
                None
            }
            None => None,
        };

        let mut valid_additional: Vec<String> = Vec::new();
        for id in &raw.additional_agents {
            if snapshot.contains(id) {
                if !valid_additional.contains(id) && *id != raw.agent_id {
                    valid_additional.push(id.clone());
                }
            } else {
                warn!(agent_id = %id, "dropping unknown additional agent from routing choice");
            }
        }

        let mut choice = if snapshot.contains(&raw.agent_id) {
            AgentChoice {
                agent_id: raw.agent_id,
                additional_agents: valid_additional,
                instructions: raw.instructions,
                confidence,
                reasoning: raw.reasoning,
                mode,
                needs_clarification: false,
            }
        } else if !valid_additional.is_empty() {
            warn!(agent_id = %raw.agent_id, "primary agent unknown; promoting first valid additional");
            let promoted = valid_additional.remove(0);
            AgentChoice {
                agent_id: promoted,
                additional_agents: valid_additional,
                instructions: raw.instructions,
                confidence,
                reasoning: raw.reasoning,
                mode,
                needs_clarification: false,
            }
        } else {
            warn!(agent_id = %raw.agent_id, "no selected agent resolves; routing to fallback");
            return self.fallback_choice(user_text, &format!(
                "selected agent '{}' is not registered",
                raw.agent_id
            ));
        };

        if choice.confidence < self.confidence_threshold {
            match self.low_confidence_action {
                LowConfidenceAction::Clarify => {
                    debug!(
                        confidence = choice.confidence,
                        "confidence below threshold; marking for clarification"
                    );
                    choice.needs_clarification = true;
                }
                LowConfidenceAction::Fallback => {
                    let reason = format!(
                        "confidence {:.2} below threshold {:.2}",
                        choice.confidence, self.confidence_threshold
                    );
                    return self.fallback_choice(user_text, &reason);
                }
            }
        }

        choice
    }

    /// The zero-confidence fallback routing.
    pub fn fallback_choice(&self, user_text: &str, reason: &str) -> AgentChoice {
        let mut instructions = HashMap::new();
        instructions.insert(self.fallback_agent.clone(), user_text.to_string());
        AgentChoice {
            agent_id: self.fallback_agent.clone(),
            additional_agents: Vec::new(),
            instructions,
            confidence: 0.0,
            reasoning: format!("Fell back to {}: {}", self.fallback_agent, reason),
            mode: None,
            needs_clarification: false,
        }
    }

    fn build_prompt(
        &self,
        user_text: &str,
        snapshot: &RegistrySnapshot,
        history: &[ConversationTurn],
    ) -> String {
        let mut prompt = String::from(
            "You route home-automation requests to specialized agents. \
             Pick the single best primary agent and, when the request spans \
             several domains, additional agents. For every selected agent \
             write a focused standalone instruction extracted from the \
             request.\n\nAvailable agents:\n",
        );
        for card in snapshot.cards() {
            prompt.push_str(&format!(
                "- {} ({}): {}\n",
                card.id, card.name, card.description
            ));
        }

        let history_block = render_history(history, HISTORY_CHAR_BUDGET);
        if !history_block.is_empty() {
            prompt.push_str("\nConversation so far:\n");
            prompt.push_str(&history_block);
        }

        prompt.push_str(&format!(
            "\nThe user's request is:\n{user_text}\n\n\
             Respond with ONLY a JSON object of this exact shape:\n\
             {{\"agentId\": \"<primary id>\", \
             \"additionalAgents\": [\"<id>\", ...], \
             \"instructions\": {{\"<id>\": \"<instruction>\", ...}}, \
             \"confidence\": <0.0-1.0>, \
             \"reasoning\": \"<one sentence>\", \
             \"mode\": \"parallel\" | \"sequential\"}}\n\
             Use only agent ids from the list above."
        ));
        prompt
    }
}

/// Render recent history within a character budget; older turns collapse to
/// one-line summaries so the newest exchanges keep their full text.
fn render_history(history: &[ConversationTurn], budget: usize) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut rendered: Vec<String> = Vec::with_capacity(history.len());
    let mut used = 0usize;
    // Walk newest-first so the budget favors recent turns.
    for turn in history.iter().rev() {
        let full = format!("user: {}\nassistant: {}\n", turn.user_text, turn.reply_text);
        if used + full.len() <= budget {
            used += full.len();
            rendered.push(full);
        } else {
            let mut summary: String = turn.user_text.chars().take(80).collect();
            if summary.len() < turn.user_text.len() {
                summary.push('…');
            }
            rendered.push(format!(
                "(earlier) user asked: {} -> {}\n",
                summary,
                turn.agents_used.join(", ")
            ));
        }
    }
    rendered.reverse();
    rendered.concat()
}

/// Parse the model's output as a [`RawChoice`], tolerating code fences.
fn parse_choice(raw: &str) -> OrchestratorResult<RawChoice> {
    let trimmed = strip_code_fences(raw.trim());
    let choice: RawChoice = serde_json::from_str(trimmed)
        .map_err(|e| OrchestratorError::router_failure(format!("schema mismatch: {e}")))?;
    if choice.agent_id.trim().is_empty() {
        return Err(OrchestratorError::router_failure("empty agentId"));
    }
    if !choice.confidence.is_finite() {
        return Err(OrchestratorError::router_failure("confidence out of range"));
    }
    Ok(choice)
}

fn strip_code_fences(raw: &str) -> &str {
    let raw = raw.trim();
    let Some(stripped) = raw.strip_prefix("```") else {
        return raw;
    };
    // Drop an optional language tag, then the closing fence.
    let body = stripped.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    body.trim().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let raw = r#"{"agentId": "light-agent", "confidence": 0.95,
            "instructions": {"light-agent": "Turn on the kitchen lights"}}"#;
        let choice = parse_choice(raw).unwrap();
        assert_eq!(choice.agent_id, "light-agent");
        assert_eq!(choice.additional_agents.len(), 0);
        assert_eq!(choice.confidence, 0.95);
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"agentId\": \"music-agent\", \"confidence\": 0.8}\n```";
        let choice = parse_choice(raw).unwrap();
        assert_eq!(choice.agent_id, "music-agent");
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_choice("I think the light agent fits best").is_err());
        assert!(parse_choice(r#"{"agentId": "", "confidence": 0.5}"#).is_err());
    }

    #[test]
    fn selected_agents_dedups_and_keeps_order() {
        let choice = AgentChoice {
            agent_id: "light-agent".to_string(),
            additional_agents: vec![
                "music-agent".to_string(),
                "light-agent".to_string(),
                "timer-agent".to_string(),
            ],
            instructions: HashMap::new(),
            confidence: 0.9,
            reasoning: String::new(),
            mode: None,
            needs_clarification: false,
        };
        assert_eq!(
            choice.selected_agents(),
            vec!["light-agent", "music-agent", "timer-agent"]
        );
    }

    #[test]
    fn history_budget_summarizes_oldest() {
        let turns: Vec<ConversationTurn> = (0..4)
            .map(|i| ConversationTurn {
                message_id: format!("m-{i}"),
                user_text: format!("request number {i} {}", "x".repeat(60)),
                reply_text: "y".repeat(60),
                agents_used: vec!["light-agent".to_string()],
                needs_input: false,
                timestamp: chrono::Utc::now().to_rfc3339(),
            })
            .collect();

        let rendered = render_history(&turns, 300);
        // Newest turn fully rendered, oldest collapsed.
        assert!(rendered.contains("request number 3"));
        assert!(rendered.contains("(earlier) user asked: request number 0"));
    }
}
