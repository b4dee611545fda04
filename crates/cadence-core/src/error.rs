//! Error types for the orchestration engine.
//!
//! Two layers exist. [`EngineError`] is returned by engine operations
//! (submission, queries, persistence, state transitions). [`StepError`] is the
//! outcome of a single step attempt; it never crosses the plan boundary and is
//! only ever persisted against the step that produced it.

use std::{fmt, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{models::PlanStatus, state::EntityRef, validator::ValidationError};

/// Comprehensive error type for all engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Database connection or query errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: rusqlite::Error,
    },
    /// Plan not found for the given ID
    #[error("Plan with ID {id} not found")]
    PlanNotFound { id: u64 },
    /// Step not found for the given plan and key
    #[error("Step '{key}' not found in plan {plan_id}")]
    StepNotFound { plan_id: u64, key: String },
    /// The submitted plan document was rejected
    #[error("Plan rejected ({}): {}", .0.reason_code(), .0)]
    Validation(#[from] ValidationError),
    /// The requested edge does not exist in the state machine
    #[error("Invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: EntityRef,
        from: &'static str,
        to: &'static str,
    },
    /// A compare-and-set transition lost a race with another writer
    #[error("Stale transition for {entity}: expected {expected} -> {to}, found {actual}")]
    StaleTransition {
        entity: EntityRef,
        expected: &'static str,
        actual: String,
        to: &'static str,
    },
    /// Another runner holds a live lease on the plan
    #[error("Plan {id} is already being run by {runner}")]
    PlanLeased { id: u64, runner: String },
    /// A step may only start while its plan is running
    #[error("Plan {id} is {status}; no new step may start")]
    PlanNotRunning { id: u64, status: PlanStatus },
    /// An internal invariant did not hold (e.g. a stalled dependency resolution)
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),
    /// A handler name was registered twice
    #[error("Agent '{name}' is already registered")]
    DuplicateAgent { name: String },
    /// File system operation errors
    #[error("File system error at path '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },
    /// XDG directory specification errors
    #[error("XDG directory error: {0}")]
    XdgDirectory(String),
    /// Invalid input validation errors
    #[error("Invalid input for field '{field}': {reason}")]
    InvalidInput { field: String, reason: String },
    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl EngineError {
    /// Creates a database error with context.
    pub fn database(message: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Database {
            message: message.into(),
            source,
        }
    }

    /// Creates an input validation error for a field.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wraps a `spawn_blocking` join failure.
    pub(crate) fn join(error: tokio::task::JoinError) -> Self {
        Self::Configuration {
            message: format!("Task join error: {error}"),
        }
    }
}

/// Failure of a single step attempt.
///
/// Whether an attempt is retried is decided by the retry policy's classifier,
/// see [`crate::retry::ErrorClass`]. The default classification is exposed by
/// [`StepError::is_retryable`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    /// No handler is registered under the step's agent name
    #[error("No agent registered under '{name}'")]
    UnknownAgent { name: String },
    /// Transient failure reported by the handler (resource busy, network)
    #[error("Transient failure: {message}")]
    Transient { message: String },
    /// The attempt exceeded its deadline
    #[error("Attempt timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },
    /// Unrecoverable failure reported by the handler
    #[error("Fatal failure: {message}")]
    Fatal { message: String },
    /// The plan was cancelled before the step could finish retrying
    #[error("Cancelled: {message}")]
    Cancelled { message: String },
    /// The step was left running by a previous process and cannot be resumed
    #[error("Interrupted: step was running when the previous run stopped")]
    Interrupted,
}

impl StepError {
    /// Default retryability: transient failures and timeouts only.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Transient { .. } | StepError::Timeout { .. })
    }

    /// Short stable name used in the execution log.
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::UnknownAgent { .. } => "unknown_agent",
            StepError::Transient { .. } => "transient",
            StepError::Timeout { .. } => "timeout",
            StepError::Fatal { .. } => "fatal",
            StepError::Cancelled { .. } => "cancelled",
            StepError::Interrupted => "interrupted",
        }
    }
}

/// Specialized extension trait for database-related Results.
pub trait DatabaseResultExt<T> {
    /// Map database errors with a message.
    fn db_context(self, message: &str) -> Result<T>;
}

impl<T> DatabaseResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn db_context(self, message: &str) -> Result<T> {
        self.map_err(|e| EngineError::database(message, e))
    }
}

/// Extension trait for Result to provide concise error mapping with
/// anyhow-style context.
pub trait ResultExt<T> {
    /// Add context to any error type, converting to EngineError.
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display,
    {
        self.map_err(|e| EngineError::Configuration {
            message: format!("{context}: {e}"),
        })
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retryability() {
        assert!(StepError::Transient { message: "busy".into() }.is_retryable());
        assert!(StepError::Timeout { after: Duration::from_millis(5) }.is_retryable());
        assert!(!StepError::Fatal { message: "bad".into() }.is_retryable());
        assert!(!StepError::UnknownAgent { name: "x".into() }.is_retryable());
        assert!(!StepError::Interrupted.is_retryable());
    }

    #[test]
    fn test_validation_error_display_carries_reason_code() {
        let err = EngineError::from(ValidationError::EmptyPlan);
        assert!(err.to_string().contains("empty_plan"));
    }

    #[test]
    fn test_timeout_display() {
        let err = StepError::Timeout { after: Duration::from_millis(250) };
        assert_eq!(err.to_string(), "Attempt timed out after 250ms");
    }
}
