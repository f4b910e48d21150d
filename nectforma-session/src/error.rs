//! Error types for nectforma-session — Railway Programming
//!
//! Every fallible operation returns `Result<T, SessionError>`.
//! Nothing in the bootstrap path is allowed to panic or escape unhandled:
//! failures end up as a message on the `Session` record instead.

use thiserror::Error;

/// Unified error type for session bootstrap and role resolution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    // ─── Remote Call Errors ───

    #[error("{label} timed out after {after_ms}ms")]
    Timeout { label: String, after_ms: u64 },

    #[error("Transient remote failure: {0}")]
    TransientRemote(String),

    #[error("Remote call rejected: {0}")]
    TerminalRemote(String),

    #[error("{label} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        label: String,
        attempts: u32,
        last_error: String,
    },

    // ─── Session Errors ───

    #[error("No authenticated session")]
    NotAuthenticated,

    #[error("No role assigned to actor {0}")]
    RoleNotAssigned(String),

    #[error("Unhandled fault: {0}")]
    Unhandled(String),

    // ─── Infrastructure Errors ───

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Actor unavailable: {0}")]
    ActorUnavailable(String),
}

impl SessionError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Timeouts and transport failures are retried; permission and
    /// authentication rejections are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::TransientRemote(_))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SessionError {
    fn from(err: tokio::task::JoinError) -> Self {
        SessionError::Unhandled(err.to_string())
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
