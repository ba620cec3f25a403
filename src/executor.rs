//! Agent executor wrapper — one agent in, one normalized response out.
//!
//! Local and remote invokers share a single contract: the wrapper enforces
//! the per-agent timeout, threads cancellation, emits lifecycle events, and
//! converts every failure into response data. `execute` never returns an
//! error; the orchestrator decides what upstream cancellation means.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::A2aClient;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::{ActivityChannel, LiveEvent};
use crate::registry::Invoker;
use crate::types::{Message, MessageSendParams, SendMessageResponse, Task, TaskState};

/// Normalized per-agent result.
///
/// The constructors keep the invariant `success ⇔ error_message == None`;
/// build responses through them rather than struct literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    /// The agent that produced this response.
    pub agent_id: String,

    /// Reply text; possibly empty on failure.
    pub content: String,

    /// Whether the invocation succeeded.
    pub success: bool,

    /// Failure description, present iff `!success`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Observed wall time in milliseconds, timeouts included.
    pub execution_time_ms: u64,

    /// True when the agent is asking a clarifying question.
    #[serde(default)]
    pub needs_input: bool,
}

impl AgentResponse {
    /// A successful response.
    pub fn ok(agent_id: impl Into<String>, content: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            content: content.into(),
            success: true,
            error_message: None,
            execution_time_ms: elapsed_ms,
            needs_input: false,
        }
    }

    /// A successful response that asks the user a clarifying question.
    pub fn input_required(
        agent_id: impl Into<String>,
        content: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            needs_input: true,
            ..Self::ok(agent_id, content, elapsed_ms)
        }
    }

    /// A failed response.
    pub fn failure(
        agent_id: impl Into<String>,
        error: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            content: String::new(),
            success: false,
            error_message: Some(error.into()),
            execution_time_ms: elapsed_ms,
            needs_input: false,
        }
    }
}

/// What one wrapper invocation produced: the response, plus the (possibly
/// new) thread handle the orchestrator merges back into the context.
#[derive(Debug, Clone)]
pub struct WrapperOutcome {
    /// The normalized response.
    pub response: AgentResponse,

    /// Thread handle to persist under this agent's id, when one exists.
    pub thread_handle: Option<String>,
}

/// Invokes one agent with a sub-instruction under timeout and cancellation.
#[derive(Clone)]
pub struct AgentExecutorWrapper {
    timeout: Duration,
    activity: ActivityChannel,
}

impl AgentExecutorWrapper {
    /// Create a wrapper with the configured per-agent timeout.
    pub fn new(timeout: Duration, activity: ActivityChannel) -> Self {
        Self { timeout, activity }
    }

    /// Invoke `agent_id` through `invoker` with `instruction`.
    ///
    /// `prior_thread` is the handle recorded for this agent in the session
    /// context, if any. Timeouts, agent failures, and upstream cancellation
    /// all come back as response data; the caller inspects its own token to
    /// re-raise cancellation.
    pub async fn execute(
        &self,
        invoker: Invoker,
        agent_id: &str,
        instruction: &str,
        session_id: &str,
        prior_thread: Option<String>,
        cancel: &CancellationToken,
    ) -> WrapperOutcome {
        let started = Instant::now();
        let is_remote = invoker.is_remote();
        let start_state = if is_remote {
            "Processing…"
        } else {
            "Processing Prompt…"
        };
        self.activity
            .publish(LiveEvent::agent_start(agent_id, start_state, is_remote));

        // Timeouts are a child token linked to the caller's.
        let attempt = cancel.child_token();
        let work = self.invoke_inner(
            &invoker,
            agent_id,
            instruction,
            session_id,
            prior_thread.clone(),
            &attempt,
        );

        let outcome = tokio::select! {
            result = tokio::time::timeout(self.timeout, work) => match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    attempt.cancel();
                    let elapsed = started.elapsed().as_millis() as u64;
                    warn!(agent_id, timeout_ms = self.timeout.as_millis() as u64, "agent execution timed out");
                    WrapperOutcome {
                        response: AgentResponse::failure(
                            agent_id,
                            format!(
                                "Agent execution timed out after {}ms.",
                                self.timeout.as_millis()
                            ),
                            elapsed,
                        ),
                        thread_handle: prior_thread,
                    }
                }
            },
            _ = cancel.cancelled() => {
                let elapsed = started.elapsed().as_millis() as u64;
                debug!(agent_id, "agent invocation canceled by caller");
                WrapperOutcome {
                    response: AgentResponse::failure(agent_id, "Canceled by caller.", elapsed),
                    thread_handle: prior_thread,
                }
            }
        };

        let elapsed = started.elapsed().as_millis() as u64;
        if outcome.response.success {
            self.activity
                .publish(LiveEvent::agent_complete(agent_id, is_remote, elapsed));
        } else {
            self.activity.publish(LiveEvent::error(
                Some(agent_id),
                outcome
                    .response
                    .error_message
                    .as_deref()
                    .unwrap_or("unknown failure"),
            ));
        }
        outcome
    }

    async fn invoke_inner(
        &self,
        invoker: &Invoker,
        agent_id: &str,
        instruction: &str,
        session_id: &str,
        prior_thread: Option<String>,
        cancel: &CancellationToken,
    ) -> WrapperOutcome {
        let started = Instant::now();
        match invoker {
            Invoker::Local { agent, sessions } => {
                // Reuse the session's thread handle or mint a new one.
                let thread = match prior_thread {
                    Some(handle) => handle,
                    None => match sessions.create_thread(session_id).await {
                        Ok(handle) => handle,
                        Err(e) => {
                            let elapsed = started.elapsed().as_millis() as u64;
                            return WrapperOutcome {
                                response: AgentResponse::failure(
                                    agent_id,
                                    format!("failed to create agent session: {e}"),
                                    elapsed,
                                ),
                                thread_handle: None,
                            };
                        }
                    },
                };

                let response = match agent.invoke(instruction, &thread, cancel).await {
                    Ok(reply) => {
                        for trace in &reply.tool_calls {
                            self.activity
                                .publish(LiveEvent::tool_call(agent_id, &trace.tool_name));
                            self.activity
                                .publish(LiveEvent::tool_result(agent_id, &trace.tool_name));
                        }
                        let elapsed = started.elapsed().as_millis() as u64;
                        if reply.needs_input {
                            AgentResponse::input_required(agent_id, reply.text, elapsed)
                        } else {
                            AgentResponse::ok(agent_id, reply.text, elapsed)
                        }
                    }
                    Err(e) => {
                        let elapsed = started.elapsed().as_millis() as u64;
                        AgentResponse::failure(agent_id, e.to_string(), elapsed)
                    }
                };
                WrapperOutcome {
                    response,
                    thread_handle: Some(thread),
                }
            }
            Invoker::Remote { card } => {
                let response = self
                    .dispatch_remote(agent_id, &card.url, &card.id, instruction, session_id)
                    .await;
                let elapsed = started.elapsed().as_millis() as u64;
                let response = match response {
                    Ok(remote) => map_remote_response(agent_id, remote, elapsed),
                    Err(e) => AgentResponse::failure(agent_id, e.to_string(), elapsed),
                };
                WrapperOutcome {
                    response,
                    thread_handle: prior_thread,
                }
            }
        }
    }

    async fn dispatch_remote(
        &self,
        agent_id: &str,
        url: &str,
        card_id: &str,
        instruction: &str,
        session_id: &str,
    ) -> OrchestratorResult<SendMessageResponse> {
        let client = A2aClient::for_agent(url, card_id);
        let mut message = Message::user(Uuid::new_v4().to_string(), instruction);
        message.context_id = Some(session_id.to_string());
        debug!(agent_id, url, "dispatching remote A2A message");
        client
            .send_message(MessageSendParams {
                message,
                metadata: None,
            })
            .await
    }
}

/// Map a remote A2A result into the normalized response shape.
///
/// `Completed`/`Working` tasks are successes whose text is the last agent
/// message; `InputRequired` is a success carrying the clarifying question;
/// any other terminal state is a failure naming the state. A raw message is
/// a plain success.
pub fn map_remote_response(
    agent_id: &str,
    response: SendMessageResponse,
    elapsed_ms: u64,
) -> AgentResponse {
    match response {
        SendMessageResponse::Message(msg) => {
            AgentResponse::ok(agent_id, msg.text_content("\n"), elapsed_ms)
        }
        SendMessageResponse::Task(task) => map_remote_task(agent_id, &task, elapsed_ms),
    }
}

fn map_remote_task(agent_id: &str, task: &Task, elapsed_ms: u64) -> AgentResponse {
    let text = task.last_agent_text().unwrap_or_default();
    match task.status.state {
        TaskState::Completed | TaskState::Working => AgentResponse::ok(agent_id, text, elapsed_ms),
        TaskState::InputRequired => AgentResponse::input_required(agent_id, text, elapsed_ms),
        state => AgentResponse::failure(
            agent_id,
            format!("Remote agent returned state '{state}'."),
            elapsed_ms,
        ),
    }
}

impl From<OrchestratorError> for AgentResponse {
    fn from(err: OrchestratorError) -> Self {
        AgentResponse::failure("unknown", err.to_string(), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, TaskStatus};

    fn remote_task(state: TaskState, text: &str) -> Task {
        Task {
            id: "t-1".to_string(),
            context_id: "ctx-1".to_string(),
            kind: "task".to_string(),
            status: TaskStatus {
                state,
                message: None,
                timestamp: None,
            },
            history: Some(vec![
                Message::user("m-1", "instruction"),
                Message {
                    role: Role::Agent,
                    ..Message::assistant("m-2", text)
                },
            ]),
            metadata: None,
        }
    }

    #[test]
    fn completed_task_maps_to_success() {
        let response = map_remote_response(
            "timer-agent",
            SendMessageResponse::Task(remote_task(
                TaskState::Completed,
                "Reminder set for 10 minutes.",
            )),
            42,
        );
        assert!(response.success);
        assert_eq!(response.content, "Reminder set for 10 minutes.");
        assert!(response.error_message.is_none());
        assert_eq!(response.execution_time_ms, 42);
    }

    #[test]
    fn working_task_maps_to_success() {
        let response = map_remote_response(
            "timer-agent",
            SendMessageResponse::Task(remote_task(TaskState::Working, "Still working on it.")),
            10,
        );
        assert!(response.success);
        assert!(!response.needs_input);
    }

    #[test]
    fn input_required_sets_needs_input() {
        let response = map_remote_response(
            "music-agent",
            SendMessageResponse::Task(remote_task(
                TaskState::InputRequired,
                "Which playlist would you like?",
            )),
            10,
        );
        assert!(response.success);
        assert!(response.needs_input);
        assert_eq!(response.content, "Which playlist would you like?");
    }

    #[test]
    fn failed_task_maps_to_failure_naming_state() {
        let response = map_remote_response(
            "timer-agent",
            SendMessageResponse::Task(remote_task(TaskState::Failed, "")),
            10,
        );
        assert!(!response.success);
        assert!(response.error_message.as_deref().unwrap().contains("failed"));
    }

    #[test]
    fn raw_message_maps_to_success() {
        let response = map_remote_response(
            "light-agent",
            SendMessageResponse::Message(Message::assistant("m-1", "Done.")),
            5,
        );
        assert!(response.success);
        assert_eq!(response.content, "Done.");
    }

    #[test]
    fn response_constructors_hold_the_invariant() {
        let ok = AgentResponse::ok("a", "fine", 1);
        assert!(ok.success && ok.error_message.is_none());
        let bad = AgentResponse::failure("a", "broke", 1);
        assert!(!bad.success && bad.error_message.is_some());
    }
}
