//! Error types for the automation engine.

use std::fmt;

use reflex_core::error::ReflexError;
use serde::{Deserialize, Serialize};

/// Errors raised while interpreting rules and performing their actions.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Rule {rule_id} is not in scope for workspace {workspace_id}")]
    Authorization {
        rule_id: String,
        workspace_id: String,
    },
    #[error("Network call failed: {0}")]
    Network(String),
    #[error("External call timed out after {0} ms")]
    Timeout(u64),
    #[error("Template rendering failed: {0}")]
    Render(String),
    #[error("Already dispatched: event {event_id}, rule {rule_id}")]
    DuplicateExecution { event_id: String, rule_id: String },
    #[error("Storage error: {0}")]
    Storage(#[source] ReflexError),
}

impl From<ReflexError> for EngineError {
    /// Collaborators report transport failures through `ReflexError`; those
    /// keep their network classification instead of becoming storage errors.
    fn from(err: ReflexError) -> Self {
        match err {
            ReflexError::Network(msg) => EngineError::Network(msg),
            ReflexError::Timeout(ms) => EngineError::Timeout(ms),
            other => EngineError::Storage(other),
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Authorization { .. } => ErrorKind::Authorization,
            EngineError::Network(_) | EngineError::Timeout(_) => ErrorKind::Network,
            EngineError::Render(_) => ErrorKind::Render,
            EngineError::DuplicateExecution { .. } => ErrorKind::DuplicateExecution,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Only transient transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Network(_) | EngineError::Timeout(_))
    }
}

/// Error classification carried on execution outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    Network,
    Render,
    DuplicateExecution,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Authorization => write!(f, "authorization"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Render => write!(f, "render"),
            ErrorKind::DuplicateExecution => write!(f, "duplicate_execution"),
            ErrorKind::Storage => write!(f, "storage"),
        }
    }
}
