//! Core error definitions for the Genius supervisor.
//!
//! Every crate in the workspace reports failures through [`GeniusError`], so
//! that the retry policy, the HTTP gateway and the CLI agree on which errors
//! are the caller's fault, which are worth retrying and which are fatal.
//!
//! # Main types
//!
//! - [`GeniusError`]: Unified error enum covering the failure taxonomy.
//! - [`GeniusResult`]: Convenience alias for `Result<T, GeniusError>`.
//! - [`ErrorKind`]: Flat, serializable classification of an error.

use serde::{Deserialize, Serialize};

// --- Error types ---

/// Top-level error type for the supervisor.
///
/// The first five variants mirror the workflow failure taxonomy; the rest
/// cover lookups and infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum GeniusError {
    /// Malformed submission or malformed payload. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network timeout, refused connection or 5xx-class response from an agent.
    #[error("Transient error from agent {agent}: {message}")]
    TransientAgent {
        /// Agent type that produced the error.
        agent: String,
        /// Human-readable cause.
        message: String,
    },

    /// The health table reports the target agent as not connected.
    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),

    /// Retries exhausted, or a non-retryable error occurred mid-pipeline.
    #[error("Phase {phase} failed permanently: {message}")]
    PermanentFailure {
        /// Phase that failed.
        phase: String,
        /// Last error observed for the phase.
        message: String,
    },

    /// All phases completed but a required field is missing or malformed.
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// No workflow with the given identifier exists.
    #[error("Workflow not found: {0}")]
    NotFound(String),

    /// The workflow exists but has no result (yet, or ever).
    #[error("Result for workflow {id} not available (status: {status})")]
    NotReady {
        /// Workflow identifier.
        id: String,
        /// Current workflow status.
        status: String,
    },

    /// An error from the workflow store.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`GeniusError`].
pub type GeniusResult<T> = Result<T, GeniusError>;

/// Flat classification of a [`GeniusError`], used in API error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`GeniusError::Validation`].
    Validation,
    /// See [`GeniusError::TransientAgent`].
    TransientAgent,
    /// See [`GeniusError::AgentUnavailable`].
    AgentUnavailable,
    /// See [`GeniusError::PermanentFailure`].
    PermanentFailure,
    /// See [`GeniusError::Aggregation`].
    Aggregation,
    /// See [`GeniusError::NotFound`].
    NotFound,
    /// See [`GeniusError::NotReady`].
    NotReady,
    /// Store, config, JSON and I/O failures.
    Internal,
}

impl GeniusError {
    /// Shorthand for a [`GeniusError::TransientAgent`].
    pub fn transient(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientAgent {
            agent: agent.into(),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GeniusError::Validation(_) => ErrorKind::Validation,
            GeniusError::TransientAgent { .. } => ErrorKind::TransientAgent,
            GeniusError::AgentUnavailable(_) => ErrorKind::AgentUnavailable,
            GeniusError::PermanentFailure { .. } => ErrorKind::PermanentFailure,
            GeniusError::Aggregation(_) => ErrorKind::Aggregation,
            GeniusError::NotFound(_) => ErrorKind::NotFound,
            GeniusError::NotReady { .. } => ErrorKind::NotReady,
            GeniusError::Store(_)
            | GeniusError::Config(_)
            | GeniusError::Json(_)
            | GeniusError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether a phase that failed with this error may be attempted again.
    ///
    /// Only transport-level agent failures and health short-circuits are
    /// retryable; validation-class errors escalate immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientAgent | ErrorKind::AgentUnavailable
        )
    }
}
