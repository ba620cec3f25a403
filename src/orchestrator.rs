//! Workflow assembly — router, fan-out, aggregation, persistence.
//!
//! One [`LuciaOrchestrator`] serves all requests. Each call to
//! [`process_request`](LuciaOrchestrator::process_request) hydrates or
//! creates the conversation context, routes, fans out to the selected agent
//! wrappers (parallel under a degree cap, or sequential), aggregates, and
//! persists task state back to the store under an etag CAS.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::aggregator::{AggregationResult, ResultAggregator};
use crate::chat::ChatClient;
use crate::config::OrchestrationConfig;
use crate::context::{
    resolve_session_id, ConversationTurn, OrchestrationContext, TaskPersistenceRecord,
};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::{ActivityChannel, LiveEvent, RoutingLog, RoutingRecord};
use crate::executor::{AgentExecutorWrapper, AgentResponse, WrapperOutcome};
use crate::registry::{AgentRegistry, Invoker, RegistrySnapshot};
use crate::router::{AgentChoice, ExecutionMode, RouterExecutor};

/// State-bag key marking a task whose last turn finished cleanly.
const COMPLETED_KEY: &str = "completed";

/// One inbound request, already validated at the wire layer.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorRequest {
    /// The user's utterance.
    pub text: String,

    /// Caller-supplied message id; duplicate turns are detected by it.
    pub message_id: Option<String>,

    /// A2A conversation id, second in the session-id priority chain.
    pub context_id: Option<String>,

    /// Present when resuming a long-running workflow.
    pub task_id: Option<String>,

    /// Explicit session override, first in the priority chain.
    pub session_id: Option<String>,
}

/// Where the turn's context came from, reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStateLabel {
    /// No prior record existed (or none was requested).
    Fresh,
    /// A persisted record was loaded for this turn.
    Resumed,
    /// The resumed task had already finished its work on an earlier turn.
    Completed,
}

impl fmt::Display for TaskStateLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStateLabel::Fresh => write!(f, "fresh"),
            TaskStateLabel::Resumed => write!(f, "resumed"),
            TaskStateLabel::Completed => write!(f, "completed"),
        }
    }
}

/// The orchestrator's reply envelope.
#[derive(Debug, Clone)]
pub struct OrchestratorReply {
    /// Aggregated reply text.
    pub text: String,

    /// True when some agent asked a clarifying question.
    pub needs_input: bool,

    /// Dispatched agents in router order.
    pub agents_used: Vec<String>,

    /// End-to-end wall time in milliseconds.
    pub execution_time_ms: u64,

    /// Where this turn's context came from.
    pub task_state: TaskStateLabel,
}

/// Request-level lifecycle states, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Routing,
    Dispatching,
    Aggregating,
    Completed,
    NeedsInput,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Routing => "routing",
            RequestState::Dispatching => "dispatching",
            RequestState::Aggregating => "aggregating",
            RequestState::Completed => "completed",
            RequestState::NeedsInput => "needs-input",
        };
        write!(f, "{name}")
    }
}

struct HydratedContext {
    context: OrchestrationContext,
    label: TaskStateLabel,
    etag: Option<String>,
}

/// The orchestration core.
pub struct LuciaOrchestrator {
    config: OrchestrationConfig,
    registry: Arc<AgentRegistry>,
    router: RouterExecutor,
    aggregator: ResultAggregator,
    wrapper: AgentExecutorWrapper,
    store: Arc<dyn crate::store::TaskStore>,
    activity: ActivityChannel,
    routing_log: Arc<RoutingLog>,
    sessions: Mutex<HashMap<String, OrchestrationContext>>,
}

impl LuciaOrchestrator {
    /// Wire the workflow graph from its collaborators.
    pub fn new(
        config: OrchestrationConfig,
        registry: Arc<AgentRegistry>,
        chat: Arc<dyn ChatClient>,
        store: Arc<dyn crate::store::TaskStore>,
    ) -> Self {
        let activity = ActivityChannel::new();
        let router = RouterExecutor::new(chat, &config);
        let wrapper = AgentExecutorWrapper::new(config.agent_timeout, activity.clone());
        Self {
            config,
            registry,
            router,
            aggregator: ResultAggregator,
            wrapper,
            store,
            activity,
            routing_log: Arc::new(RoutingLog::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The live-activity channel this orchestrator publishes into.
    pub fn activity(&self) -> &ActivityChannel {
        &self.activity
    }

    /// The routing-decision ring buffer.
    pub fn routing_log(&self) -> Arc<RoutingLog> {
        Arc::clone(&self.routing_log)
    }

    /// The agent registry.
    pub fn registry(&self) -> Arc<AgentRegistry> {
        Arc::clone(&self.registry)
    }

    /// The resolved configuration.
    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    /// The task store.
    pub fn store(&self) -> Arc<dyn crate::store::TaskStore> {
        Arc::clone(&self.store)
    }

    /// Run one request through the workflow.
    ///
    /// Always returns a structured reply or a mapped error; caller-initiated
    /// cancellation comes back as [`OrchestratorError::Canceled`] with no
    /// persistence side effects and no `requestComplete` event.
    pub async fn process_request(
        &self,
        request: OrchestratorRequest,
        cancel: CancellationToken,
    ) -> OrchestratorResult<OrchestratorReply> {
        let started = Instant::now();
        self.activity.publish(LiveEvent::request_start());

        let result = self.run(&request, &cancel, started).await;

        match result {
            Ok(reply) => {
                self.activity
                    .publish(LiveEvent::request_complete(reply.execution_time_ms));
                Ok(reply)
            }
            Err(OrchestratorError::Canceled) => Err(OrchestratorError::Canceled),
            Err(err) => {
                let mapped = match err {
                    e @ OrchestratorError::RouterFailure { .. } => e,
                    e @ OrchestratorError::AgentTimeout { .. } => e,
                    e => OrchestratorError::workflow(e.to_string()),
                };
                self.activity
                    .publish(LiveEvent::error(None, &mapped.to_string()));
                Err(mapped)
            }
        }
    }

    async fn run(
        &self,
        request: &OrchestratorRequest,
        cancel: &CancellationToken,
        started: Instant,
    ) -> OrchestratorResult<OrchestratorReply> {
        let session_id = resolve_session_id(
            request.session_id.as_deref(),
            request.context_id.as_deref(),
            &request.text,
        );
        let hydrated = self.hydrate(&session_id, request.task_id.as_deref()).await;
        let HydratedContext {
            mut context,
            label,
            etag,
        } = hydrated;

        // Duplicate turn: same messageId in this session replays the
        // recorded reply without re-invoking any agent.
        if let Some(message_id) = request.message_id.as_deref() {
            if let Some(turn) = context.find_turn(message_id) {
                debug!(message_id, session_id = %session_id, "duplicate message replayed from history");
                return Ok(OrchestratorReply {
                    text: turn.reply_text.clone(),
                    needs_input: turn.needs_input,
                    agents_used: turn.agents_used.clone(),
                    execution_time_ms: started.elapsed().as_millis() as u64,
                    task_state: label,
                });
            }
        }

        debug!(session_id = %session_id, state = %RequestState::Routing, "request state");
        let snapshot = self.registry.snapshot().await;
        let outcome = self
            .router
            .route(&request.text, &snapshot, &context.history)
            .await?;
        let choice = outcome.choice;

        self.activity
            .publish(LiveEvent::routing(&choice.agent_id, choice.confidence));
        self.routing_log.record(RoutingRecord {
            message_summary: summarize(&request.text),
            primary: choice.agent_id.clone(),
            additional: choice.additional_agents.clone(),
            confidence: choice.confidence,
            reasoning: choice.reasoning.clone(),
            elapsed_ms: outcome.elapsed_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });

        if cancel.is_cancelled() {
            return Err(OrchestratorError::Canceled);
        }

        let (aggregation, agents_used, primary) = if choice.needs_clarification {
            debug!(session_id = %session_id, state = %RequestState::NeedsInput, "request state");
            (self.aggregator.clarification(&choice.reasoning), Vec::new(), None)
        } else {
            debug!(session_id = %session_id, state = %RequestState::Dispatching, "request state");
            let mode = self.effective_mode(&choice);
            let dispatched = self
                .dispatch(
                    &choice,
                    &snapshot,
                    &mut context,
                    &session_id,
                    &request.text,
                    cancel,
                )
                .await?;

            if cancel.is_cancelled() {
                return Err(OrchestratorError::Canceled);
            }

            debug!(session_id = %session_id, state = %RequestState::Aggregating, "request state");
            let declared: Vec<String> = dispatched.iter().map(|(id, _)| id.clone()).collect();
            let responses: Vec<AgentResponse> =
                dispatched.into_iter().map(|(_, r)| r).collect();
            let aggregation = self.aggregator.aggregate(&declared, &responses, mode);
            (aggregation, declared, Some(choice.agent_id.clone()))
        };

        self.finish_turn(
            request,
            &session_id,
            &mut context,
            label,
            etag,
            &aggregation,
            &agents_used,
            primary,
        )
        .await;

        let state = if aggregation.needs_input {
            RequestState::NeedsInput
        } else {
            RequestState::Completed
        };
        debug!(session_id = %session_id, state = %state, "request state");

        Ok(OrchestratorReply {
            text: aggregation.text,
            needs_input: aggregation.needs_input,
            agents_used,
            execution_time_ms: started.elapsed().as_millis() as u64,
            task_state: label,
        })
    }

    /// Load the context for this turn: the task store when a task id is
    /// present, the in-process session cache otherwise.
    async fn hydrate(&self, session_id: &str, task_id: Option<&str>) -> HydratedContext {
        if let Some(task_id) = task_id {
            match self.store.load(task_id).await {
                Ok(Some(record)) => match record.decode() {
                    Ok(context) => {
                        let completed = context
                            .state_bag
                            .get(COMPLETED_KEY)
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false);
                        let label = if completed {
                            TaskStateLabel::Completed
                        } else {
                            TaskStateLabel::Resumed
                        };
                        debug!(task_id, label = %label, "task context resumed");
                        return HydratedContext {
                            context,
                            label,
                            etag: Some(record.etag),
                        };
                    }
                    Err(e) => {
                        warn!(task_id, error = %e, "stored task record is unreadable; starting fresh");
                    }
                },
                Ok(None) => {
                    debug!(task_id, "no task record found; starting fresh");
                }
                Err(e) => {
                    warn!(task_id, error = %e, "task store read failed; starting fresh");
                }
            }
            let mut context = OrchestrationContext::new(session_id);
            context.task_id = Some(task_id.to_string());
            return HydratedContext {
                context,
                label: TaskStateLabel::Fresh,
                etag: None,
            };
        }

        let sessions = self.sessions.lock().await;
        let context = sessions
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| OrchestrationContext::new(session_id));
        HydratedContext {
            context,
            label: TaskStateLabel::Fresh,
            etag: None,
        }
    }

    fn effective_mode(&self, choice: &AgentChoice) -> ExecutionMode {
        match choice.mode {
            Some(mode) => mode,
            None if self.config.enable_multi_agent => ExecutionMode::Parallel,
            None => ExecutionMode::Sequential,
        }
    }

    /// Fan out to the selected agents and collect `(agent_id, response)` in
    /// router-declared order, merging new thread handles into the context.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        &self,
        choice: &AgentChoice,
        snapshot: &RegistrySnapshot,
        context: &mut OrchestrationContext,
        session_id: &str,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<Vec<(String, AgentResponse)>> {
        // Resolutions are captured here, against this request's snapshot.
        let mut plan: Vec<(String, Invoker, String)> = Vec::new();
        for agent_id in choice.selected_agents() {
            match snapshot.resolve_invoker(&agent_id) {
                Ok(invoker) => {
                    let instruction = choice.instruction_for(&agent_id, user_text);
                    plan.push((agent_id, invoker, instruction.to_string()));
                }
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "selected agent failed to resolve");
                }
            }
        }
        if plan.is_empty() {
            return Err(OrchestratorError::router_failure(
                "no selected agent resolves in the registry",
            ));
        }

        let mode = self.effective_mode(choice);
        let outcomes: Vec<(String, WrapperOutcome)> = match mode {
            ExecutionMode::Sequential => {
                let mut outcomes = Vec::with_capacity(plan.len());
                for (agent_id, invoker, instruction) in plan {
                    if cancel.is_cancelled() {
                        return Err(OrchestratorError::Canceled);
                    }
                    let prior = context.agent_threads.get(&agent_id).cloned();
                    let outcome = self
                        .wrapper
                        .execute(invoker, &agent_id, &instruction, session_id, prior, cancel)
                        .await;
                    outcomes.push((agent_id, outcome));
                }
                outcomes
            }
            ExecutionMode::Parallel => {
                let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_agents.max(1)));
                let futures = plan.into_iter().map(|(agent_id, invoker, instruction)| {
                    let wrapper = self.wrapper.clone();
                    let semaphore = Arc::clone(&semaphore);
                    let cancel = cancel.clone();
                    let session_id = session_id.to_string();
                    let prior = context.agent_threads.get(&agent_id).cloned();
                    async move {
                        // The permit bounds the degree of parallelism; a
                        // closed semaphore cannot happen while we hold it.
                        let _permit = semaphore.acquire().await.expect("semaphore closed");
                        let outcome = wrapper
                            .execute(invoker, &agent_id, &instruction, &session_id, prior, &cancel)
                            .await;
                        (agent_id, outcome)
                    }
                });
                join_all(futures).await
            }
        };

        let mut responses = Vec::with_capacity(outcomes.len());
        for (agent_id, outcome) in outcomes {
            if let Some(handle) = outcome.thread_handle {
                context.agent_threads.insert(agent_id.clone(), handle);
            }
            responses.push((agent_id, outcome.response));
        }
        Ok(responses)
    }

    /// Record the turn in the context and persist it when a task id exists.
    #[allow(clippy::too_many_arguments)]
    async fn finish_turn(
        &self,
        request: &OrchestratorRequest,
        session_id: &str,
        context: &mut OrchestrationContext,
        label: TaskStateLabel,
        etag: Option<String>,
        aggregation: &AggregationResult,
        agents_used: &[String],
        primary: Option<String>,
    ) {
        let turn = ConversationTurn {
            message_id: request
                .message_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            user_text: request.text.clone(),
            reply_text: aggregation.text.clone(),
            agents_used: agents_used.to_vec(),
            needs_input: aggregation.needs_input,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        context.push_turn(turn.clone(), self.config.max_conversation_history);
        if let Some(primary) = primary {
            context.previous_agent_id = Some(primary);
        }
        // A task completes once a RESUMED turn finishes without asking for
        // input; the creating turn only starts the workflow. The record is
        // kept either way and the TTL reaps it.
        if request.task_id.is_some()
            && !aggregation.needs_input
            && label != TaskStateLabel::Fresh
        {
            context
                .state_bag
                .insert(COMPLETED_KEY.to_string(), serde_json::Value::Bool(true));
        }

        if let Some(task_id) = request.task_id.as_deref() {
            self.persist(task_id, context, etag, &turn, label).await;
        }

        let mut sessions = self.sessions.lock().await;
        sessions.insert(session_id.to_string(), context.clone());
    }

    /// CAS write with one reload-reapply-retry on conflict, one retry on
    /// plain failure; the user still gets their reply either way.
    async fn persist(
        &self,
        task_id: &str,
        context: &OrchestrationContext,
        etag: Option<String>,
        turn: &ConversationTurn,
        label: TaskStateLabel,
    ) {
        let record = match TaskPersistenceRecord::encode(task_id, context, self.config.task_ttl) {
            Ok(record) => record,
            Err(e) => {
                warn!(task_id, error = %e, "failed to encode task record");
                return;
            }
        };

        match self.store.store(record, etag.as_deref()).await {
            Ok(()) => {}
            Err(OrchestratorError::CasConflict { .. }) => {
                debug!(task_id, "etag conflict; reloading and reapplying turn");
                match self.store.load(task_id).await {
                    Ok(Some(current)) => {
                        let mut reloaded = match current.decode() {
                            Ok(ctx) => ctx,
                            Err(e) => {
                                warn!(task_id, error = %e, "conflicting record unreadable; dropping write");
                                return;
                            }
                        };
                        reloaded.push_turn(turn.clone(), self.config.max_conversation_history);
                        for (agent_id, handle) in &context.agent_threads {
                            reloaded
                                .agent_threads
                                .entry(agent_id.clone())
                                .or_insert_with(|| handle.clone());
                        }
                        reloaded.previous_agent_id = context.previous_agent_id.clone();
                        if !turn.needs_input && label != TaskStateLabel::Fresh {
                            reloaded
                                .state_bag
                                .insert(COMPLETED_KEY.to_string(), serde_json::Value::Bool(true));
                        }
                        let record = match TaskPersistenceRecord::encode(
                            task_id,
                            &reloaded,
                            self.config.task_ttl,
                        ) {
                            Ok(record) => record,
                            Err(e) => {
                                warn!(task_id, error = %e, "failed to re-encode task record");
                                return;
                            }
                        };
                        if let Err(e) = self.store.store(record, Some(&current.etag)).await {
                            warn!(task_id, error = %e, "task write lost the retry; next turn may not see this one");
                        }
                    }
                    Ok(None) | Err(_) => {
                        warn!(task_id, label = %label, "conflicting record vanished; dropping write");
                    }
                }
            }
            Err(e) => {
                warn!(task_id, error = %e, "task write failed; retrying once");
                let retry =
                    match TaskPersistenceRecord::encode(task_id, context, self.config.task_ttl) {
                        Ok(record) => record,
                        Err(encode_err) => {
                            warn!(task_id, error = %encode_err, "failed to encode retry record");
                            return;
                        }
                    };
                if let Err(e) = self.store.store(retry, etag.as_deref()).await {
                    warn!(task_id, error = %e, "task write failed twice; next turn may not see this one");
                }
            }
        }
    }
}

fn summarize(text: &str) -> String {
    let flat = text.trim().replace('\n', " ");
    if flat.chars().count() > 120 {
        let mut summary: String = flat.chars().take(120).collect();
        summary.push('…');
        summary
    } else {
        flat
    }
}
