//! Result aggregation — N agent responses in, one reply out.
//!
//! The aggregator is deterministic: output order follows the router's
//! declaration order, never completion order. A needs-input response takes
//! the lead position, failures collapse into short trailing notes, and
//! total execution time is max or sum depending on the fan-out mode.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::executor::AgentResponse;
use crate::router::ExecutionMode;

/// The merged outcome of one fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationResult {
    /// The combined reply text.
    pub text: String,

    /// Ids of agents that succeeded, in router-declared order.
    pub successful_agents: Vec<String>,

    /// Ids of agents that failed, in router-declared order.
    pub failed_agents: Vec<String>,

    /// Max of per-response times under parallel fan-out, sum under sequential.
    pub total_execution_time_ms: u64,

    /// True when some agent asked a clarifying question.
    pub needs_input: bool,
}

/// Partial aggregation state for responses that arrive across multiple
/// handler invocations, keyed by agent id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultAggregationState {
    /// Responses received so far.
    pub responses: HashMap<String, AgentResponse>,
}

impl ResultAggregationState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one response, replacing any earlier one from the same agent.
    pub fn record(&mut self, response: AgentResponse) {
        self.responses.insert(response.agent_id.clone(), response);
    }

    /// Whether every declared agent has reported.
    pub fn is_complete(&self, declared: &[String]) -> bool {
        declared.iter().all(|id| self.responses.contains_key(id))
    }
}

/// Deterministic merger of agent responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator;

impl ResultAggregator {
    /// Merge responses into a single result.
    ///
    /// `declared` is the router's order (primary first); responses may be
    /// provided in any order.
    pub fn aggregate(
        &self,
        declared: &[String],
        responses: &[AgentResponse],
        mode: ExecutionMode,
    ) -> AggregationResult {
        let by_id: HashMap<&str, &AgentResponse> = responses
            .iter()
            .map(|r| (r.agent_id.as_str(), r))
            .collect();

        let ordered: Vec<&AgentResponse> = declared
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).copied())
            .collect();

        let mut successful_agents = Vec::new();
        let mut failed_agents = Vec::new();
        let mut success_texts: Vec<&str> = Vec::new();
        let mut failure_notes: Vec<String> = Vec::new();
        let mut needs_input_text: Option<&str> = None;

        for response in &ordered {
            if response.success {
                successful_agents.push(response.agent_id.clone());
                if response.needs_input && needs_input_text.is_none() {
                    needs_input_text = Some(response.content.as_str());
                } else if !response.content.trim().is_empty() {
                    success_texts.push(response.content.as_str());
                }
            } else {
                failed_agents.push(response.agent_id.clone());
                failure_notes.push(format!(
                    "({}: {})",
                    response.agent_id,
                    response
                        .error_message
                        .as_deref()
                        .unwrap_or("unknown failure")
                ));
            }
        }

        let total_execution_time_ms = match mode {
            ExecutionMode::Parallel => ordered
                .iter()
                .map(|r| r.execution_time_ms)
                .max()
                .unwrap_or(0),
            ExecutionMode::Sequential => {
                ordered.iter().map(|r| r.execution_time_ms).sum()
            }
        };

        let text = if let Some(question) = needs_input_text {
            // The system is asking the user something; other successes ride
            // beneath a divider so they aren't lost.
            let mut text = question.to_string();
            if !success_texts.is_empty() {
                text.push_str("\n---\n");
                text.push_str(&success_texts.join("\n"));
            }
            if !failure_notes.is_empty() {
                text.push('\n');
                text.push_str(&failure_notes.join("\n"));
            }
            text
        } else if successful_agents.is_empty() && !failed_agents.is_empty() {
            format!(
                "I'm sorry, I couldn't complete that request. {}",
                failure_notes.join(" ")
            )
        } else {
            let mut text = success_texts.join("\n");
            if !failure_notes.is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&failure_notes.join("\n"));
            }
            text
        };

        AggregationResult {
            text,
            successful_agents,
            failed_agents,
            total_execution_time_ms,
            needs_input: needs_input_text.is_some(),
        }
    }

    /// Result for a low-confidence routing that asks the user to clarify
    /// instead of dispatching.
    pub fn clarification(&self, reasoning: &str) -> AggregationResult {
        let text = if reasoning.trim().is_empty() {
            "I'm not sure which device or service you mean. Could you rephrase that with a bit \
             more detail?"
                .to_string()
        } else {
            format!(
                "I'm not sure which device or service you mean ({}). Could you rephrase that \
                 with a bit more detail?",
                reasoning.trim()
            )
        };
        AggregationResult {
            text,
            successful_agents: Vec::new(),
            failed_agents: Vec::new(),
            total_execution_time_ms: 0,
            needs_input: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(agent: &str, content: &str, ms: u64) -> AgentResponse {
        AgentResponse::ok(agent, content, ms)
    }

    fn failed(agent: &str, error: &str, ms: u64) -> AgentResponse {
        AgentResponse::failure(agent, error, ms)
    }

    fn declared(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn successes_concatenate_in_declared_order() {
        let aggregator = ResultAggregator;
        // Responses arrive in completion order, music first.
        let responses = vec![
            ok("music-agent", "Playing jazz.", 120),
            ok("light-agent", "Kitchen lights are on.", 80),
        ];
        let result = aggregator.aggregate(
            &declared(&["light-agent", "music-agent"]),
            &responses,
            ExecutionMode::Parallel,
        );
        assert_eq!(result.text, "Kitchen lights are on.\nPlaying jazz.");
        assert_eq!(result.successful_agents, declared(&["light-agent", "music-agent"]));
        assert!(result.failed_agents.is_empty());
        assert_eq!(result.total_execution_time_ms, 120);
        assert!(!result.needs_input);
    }

    #[test]
    fn failure_note_trails_partial_success() {
        let aggregator = ResultAggregator;
        let responses = vec![
            ok("light-agent", "Lights off.", 40),
            failed(
                "thermostat-agent",
                "Agent execution timed out after 30000ms.",
                30000,
            ),
        ];
        let result = aggregator.aggregate(
            &declared(&["light-agent", "thermostat-agent"]),
            &responses,
            ExecutionMode::Parallel,
        );
        assert_eq!(
            result.text,
            "Lights off.\n(thermostat-agent: Agent execution timed out after 30000ms.)"
        );
        assert_eq!(result.failed_agents, declared(&["thermostat-agent"]));
        assert_eq!(result.total_execution_time_ms, 30000);
    }

    #[test]
    fn all_failures_produce_single_apology() {
        let aggregator = ResultAggregator;
        let responses = vec![
            failed("light-agent", "bridge offline", 10),
            failed("music-agent", "no speaker found", 12),
        ];
        let result = aggregator.aggregate(
            &declared(&["light-agent", "music-agent"]),
            &responses,
            ExecutionMode::Sequential,
        );
        assert!(result.text.starts_with("I'm sorry"));
        assert!(result.text.contains("light-agent: bridge offline"));
        assert!(result.text.contains("music-agent: no speaker found"));
        assert!(result.successful_agents.is_empty());
        assert_eq!(result.total_execution_time_ms, 22);
    }

    #[test]
    fn needs_input_leads_the_reply() {
        let aggregator = ResultAggregator;
        let mut question = ok("music-agent", "Which playlist would you like?", 50);
        question.needs_input = true;
        let responses = vec![ok("light-agent", "Kitchen lights are on.", 30), question];
        let result = aggregator.aggregate(
            &declared(&["light-agent", "music-agent"]),
            &responses,
            ExecutionMode::Parallel,
        );
        assert!(result.needs_input);
        assert!(result.text.starts_with("Which playlist would you like?"));
        assert!(result.text.contains("---\nKitchen lights are on."));
    }

    #[test]
    fn empty_successful_contents_are_skipped() {
        let aggregator = ResultAggregator;
        let responses = vec![
            ok("light-agent", "", 5),
            ok("music-agent", "Playing jazz.", 6),
        ];
        let result = aggregator.aggregate(
            &declared(&["light-agent", "music-agent"]),
            &responses,
            ExecutionMode::Parallel,
        );
        assert_eq!(result.text, "Playing jazz.");
        // An empty success still counts as a success.
        assert_eq!(result.successful_agents.len(), 2);
    }

    #[test]
    fn sequential_mode_sums_execution_times() {
        let aggregator = ResultAggregator;
        let responses = vec![ok("a", "one", 10), ok("b", "two", 20)];
        let result = aggregator.aggregate(&declared(&["a", "b"]), &responses, ExecutionMode::Sequential);
        assert_eq!(result.total_execution_time_ms, 30);
    }

    #[test]
    fn aggregation_state_tracks_completeness() {
        let mut state = ResultAggregationState::new();
        let ids = declared(&["light-agent", "music-agent"]);
        assert!(!state.is_complete(&ids));
        state.record(ok("light-agent", "done", 1));
        assert!(!state.is_complete(&ids));
        state.record(ok("music-agent", "done", 1));
        assert!(state.is_complete(&ids));
    }
}
