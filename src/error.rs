//! Orchestrator error types — JSON-RPC error codes + orchestration failures.
//!
//! Two layers share one enum:
//! - Standard JSON-RPC 2.0 errors (-32700 through -32603) plus the A2A task
//!   errors the endpoint still answers for reserved methods
//! - Application-level orchestration failures (`ROUTER_FAILURE`,
//!   `AGENT_TIMEOUT`, `WORKFLOW_ERROR`) surfaced through the same envelope

use crate::types::JsonRpcError;

// ---------------------------------------------------------------------------
// Standard JSON-RPC 2.0 error codes
// ---------------------------------------------------------------------------

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i64 = -32700;

/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i64 = -32600;

/// The method does not exist / is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Invalid method parameter(s).
pub const INVALID_PARAMS: i64 = -32602;

/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

// ---------------------------------------------------------------------------
// A2A task error codes (reserved methods answer with these)
// ---------------------------------------------------------------------------

/// The requested task was not found.
pub const TASK_NOT_FOUND: i64 = -32001;

/// The task cannot be canceled in its current state.
pub const TASK_NOT_CANCELABLE: i64 = -32002;

/// The requested operation is not supported.
pub const UNSUPPORTED_OPERATION: i64 = -32004;

// ---------------------------------------------------------------------------
// Application-level orchestration error codes
// ---------------------------------------------------------------------------

/// The router could not produce a valid choice after all retries.
pub const ROUTER_FAILURE: i64 = -32010;

/// A selected agent exhausted its execution timeout.
pub const AGENT_TIMEOUT: i64 = -32011;

/// An unhandled failure inside the workflow graph.
pub const WORKFLOW_ERROR: i64 = -32012;

/// Unified error type for the orchestration core.
///
/// Validation variants map straight onto JSON-RPC codes; orchestration
/// variants carry the app-level codes and a symbolic name in the error
/// `data` payload so clients can branch without parsing messages.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrchestratorError {
    /// Invalid JSON payload (code -32700).
    #[error("Parse error: {message}")]
    ParseError {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Request envelope validation error (code -32600).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Method not found, or the path names an unknown agent (code -32601).
    #[error("Method not found: {message}")]
    MethodNotFound {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Invalid parameters (code -32602).
    #[error("Invalid params: {message}")]
    InvalidParams {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Internal error (code -32603).
    #[error("Internal error: {message}")]
    InternalError {
        /// Human-readable error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Task not found (code -32001).
    #[error("Task not found: {message}")]
    TaskNotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Task cannot be canceled (code -32002).
    #[error("Task not cancelable: {message}")]
    TaskNotCancelable {
        /// Human-readable error message.
        message: String,
    },

    /// Operation not supported (code -32004).
    #[error("Unsupported operation: {message}")]
    UnsupportedOperation {
        /// Human-readable error message.
        message: String,
    },

    /// An agent id did not resolve in the registry snapshot.
    #[error("Unknown agent: {agent_id}")]
    UnknownAgent {
        /// The id that failed to resolve.
        agent_id: String,
    },

    /// The router exhausted its retries without a parseable choice.
    #[error("Routing failed: {message}")]
    RouterFailure {
        /// What went wrong across the attempts.
        message: String,
    },

    /// A wrapper-level timeout, reported when it must surface past the
    /// aggregator (the wrapper itself converts timeouts into response data).
    #[error("Agent {agent_id} timed out after {elapsed_ms}ms")]
    AgentTimeout {
        /// The agent that timed out.
        agent_id: String,
        /// Observed wall time in milliseconds.
        elapsed_ms: u64,
    },

    /// Any unhandled failure inside the workflow graph.
    #[error("Workflow error: {message}")]
    WorkflowError {
        /// Human-readable error message.
        message: String,
    },

    /// Task store read/write failure.
    #[error("Persistence error: {message}")]
    Persistence {
        /// Human-readable error message.
        message: String,
    },

    /// A compare-and-swap write lost the race for a task record.
    #[error("Concurrent write detected for task {task_id}")]
    CasConflict {
        /// The contended task id.
        task_id: String,
    },

    /// An external dependency (chat model) is unavailable.
    #[error("Dependency error: {message}")]
    Dependency {
        /// Human-readable error message.
        message: String,
    },

    /// The caller canceled the request.
    #[error("Request canceled by caller")]
    Canceled,

    // -- Transport-side errors for the outbound A2A client --
    /// Transport-level error (connection failed, request failed, etc.).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request timed out at the transport layer.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// HTTP error with status code and response body.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Invalid JSON received from a remote agent.
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// A JSON-RPC error response was received from a remote agent.
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },
}

/// Convenience result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Create a `ParseError` with a message and no data.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            data: None,
        }
    }

    /// Create an `InvalidRequest` with a message and no data.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            data: None,
        }
    }

    /// Create a `MethodNotFound` with a message and no data.
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::MethodNotFound {
            message: message.into(),
            data: None,
        }
    }

    /// Create an `InvalidParams` with a message and no data.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
            data: None,
        }
    }

    /// Create an `InternalError` with a message and no data.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
            data: None,
        }
    }

    /// Create an `UnsupportedOperation` with a message.
    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }

    /// Create a `TaskNotFound` with a message.
    pub fn task_not_found(message: impl Into<String>) -> Self {
        Self::TaskNotFound {
            message: message.into(),
        }
    }

    /// Create a `TaskNotCancelable` with a message.
    pub fn task_not_cancelable(message: impl Into<String>) -> Self {
        Self::TaskNotCancelable {
            message: message.into(),
        }
    }

    /// Create a `RouterFailure` with a message.
    pub fn router_failure(message: impl Into<String>) -> Self {
        Self::RouterFailure {
            message: message.into(),
        }
    }

    /// Create a `WorkflowError` with a message.
    pub fn workflow(message: impl Into<String>) -> Self {
        Self::WorkflowError {
            message: message.into(),
        }
    }

    /// Create a `Persistence` error with a message.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create a `Dependency` error with a message.
    pub fn dependency(message: impl Into<String>) -> Self {
        Self::Dependency {
            message: message.into(),
        }
    }

    /// Returns the JSON-RPC error code for this variant.
    ///
    /// Transport-side errors that have no protocol code map to -32603.
    pub fn code(&self) -> i64 {
        match self {
            OrchestratorError::ParseError { .. } => PARSE_ERROR,
            OrchestratorError::InvalidRequest { .. } => INVALID_REQUEST,
            OrchestratorError::MethodNotFound { .. } | OrchestratorError::UnknownAgent { .. } => {
                METHOD_NOT_FOUND
            }
            OrchestratorError::InvalidParams { .. } => INVALID_PARAMS,
            OrchestratorError::InternalError { .. } => INTERNAL_ERROR,
            OrchestratorError::TaskNotFound { .. } => TASK_NOT_FOUND,
            OrchestratorError::TaskNotCancelable { .. } => TASK_NOT_CANCELABLE,
            OrchestratorError::UnsupportedOperation { .. } => UNSUPPORTED_OPERATION,
            OrchestratorError::RouterFailure { .. } => ROUTER_FAILURE,
            OrchestratorError::AgentTimeout { .. } => AGENT_TIMEOUT,
            OrchestratorError::WorkflowError { .. } => WORKFLOW_ERROR,
            OrchestratorError::Persistence { .. }
            | OrchestratorError::CasConflict { .. }
            | OrchestratorError::Dependency { .. }
            | OrchestratorError::Canceled
            | OrchestratorError::Transport(_)
            | OrchestratorError::Timeout(_)
            | OrchestratorError::Http { .. }
            | OrchestratorError::InvalidJson(_) => INTERNAL_ERROR,
            OrchestratorError::JsonRpc { code, .. } => *code,
        }
    }

    /// Symbolic name for the app-level failure kinds, carried in the error
    /// `data` payload of the JSON-RPC envelope.
    pub fn kind_name(&self) -> Option<&'static str> {
        match self {
            OrchestratorError::RouterFailure { .. } => Some("ROUTER_FAILURE"),
            OrchestratorError::AgentTimeout { .. } => Some("AGENT_TIMEOUT"),
            OrchestratorError::WorkflowError { .. } => Some("WORKFLOW_ERROR"),
            _ => None,
        }
    }
}

impl From<OrchestratorError> for JsonRpcError {
    fn from(err: OrchestratorError) -> Self {
        let code = err.code();
        let message = err.to_string();
        let data = match &err {
            OrchestratorError::ParseError { data, .. }
            | OrchestratorError::InvalidRequest { data, .. }
            | OrchestratorError::MethodNotFound { data, .. }
            | OrchestratorError::InvalidParams { data, .. }
            | OrchestratorError::InternalError { data, .. }
            | OrchestratorError::JsonRpc { data, .. } => data.clone(),
            _ => err
                .kind_name()
                .map(|name| serde_json::json!({ "code": name })),
        };
        JsonRpcError {
            code,
            message,
            data,
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::ParseError {
            message: err.to_string(),
            data: None,
        }
    }
}

impl From<redis::RedisError> for OrchestratorError {
    fn from(err: redis::RedisError) -> Self {
        OrchestratorError::Persistence {
            message: err.to_string(),
        }
    }
}
