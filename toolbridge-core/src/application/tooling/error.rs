use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolInvokeError {
    #[error("worker '{server}' is not configured")]
    NotConfigured { server: String },
    #[error("tool '{tool}' is not offered by worker '{server}'")]
    NotFound { server: String, tool: String },
    #[error("worker '{server}' is unavailable: {reason}")]
    ConnectionUnavailable { server: String, reason: String },
    #[error("worker '{server}' did not answer '{method}' within {elapsed:?}")]
    Timeout {
        server: String,
        method: String,
        elapsed: Duration,
    },
    #[error("every calling convention failed for tool '{tool}' on worker '{server}': {last}")]
    AllAttemptsFailed {
        server: String,
        tool: String,
        last: String,
    },
    #[error("worker-error:{message}")]
    Worker {
        server: String,
        code: Option<i64>,
        message: String,
    },
    #[error("worker '{server}' transport error: {message}")]
    Transport { server: String, message: String },
    #[error("worker '{server}' produced invalid JSON: {source}")]
    InvalidJson {
        server: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("worker '{server}' terminated before answering")]
    Terminated { server: String },
    #[error("worker '{server}' returned an unusable tool catalog: {reason}")]
    InvalidCatalog { server: String, reason: String },
}

/// JSON-RPC codes that mean the worker did not understand the call shape.
const CONVENTION_MISMATCH_CODES: [i64; 4] = [-32700, -32600, -32601, -32602];

impl ToolInvokeError {
    /// Stable machine-readable tag for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolInvokeError::NotConfigured { .. } => "not-configured",
            ToolInvokeError::NotFound { .. } => "not-found",
            ToolInvokeError::ConnectionUnavailable { .. } => "connection-unavailable",
            ToolInvokeError::Timeout { .. } => "timeout",
            ToolInvokeError::AllAttemptsFailed { .. } => "all-attempts-failed",
            ToolInvokeError::Worker { .. } => "worker-error",
            ToolInvokeError::Transport { .. } => "transport",
            ToolInvokeError::InvalidJson { .. } => "invalid-json",
            ToolInvokeError::Terminated { .. } => "terminated",
            ToolInvokeError::InvalidCatalog { .. } => "invalid-catalog",
        }
    }

    /// True when the worker rejected the wire shape rather than the call itself.
    pub(crate) fn is_convention_mismatch(&self) -> bool {
        matches!(
            self,
            ToolInvokeError::Worker { code: Some(code), .. } if CONVENTION_MISMATCH_CODES.contains(code)
        )
    }

    /// True when the pipe to the worker is gone.
    pub(crate) fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            ToolInvokeError::Transport { .. } | ToolInvokeError::Terminated { .. }
        )
    }
}
