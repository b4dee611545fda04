//! Append-only records: settled step results and execution log entries.

use std::str::FromStr;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a result record captures a success or a failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultOutcome {
    Success,
    Failure,
}

impl ResultOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultOutcome::Success => "success",
            ResultOutcome::Failure => "failure",
        }
    }
}

impl FromStr for ResultOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ResultOutcome::Success),
            "failure" => Ok(ResultOutcome::Failure),
            _ => Err(format!("Invalid result outcome: {s}")),
        }
    }
}

/// Result of a settled step. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRecord {
    pub id: u64,
    pub plan_id: u64,
    pub step_id: u64,
    /// Key of the step this result belongs to
    pub step_key: String,
    /// The attempt that produced the record (1-based)
    pub attempt: u32,
    pub outcome: ResultOutcome,
    /// Normalized payload on success, `{"error": ..}` on failure
    pub payload: Value,
    pub created_at: Timestamp,
}

/// Kind of event recorded in the execution log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    AttemptSucceeded,
    AttemptFailed,
    StepSkipped,
    PlanTransition,
}

impl LogEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEvent::AttemptSucceeded => "attempt_succeeded",
            LogEvent::AttemptFailed => "attempt_failed",
            LogEvent::StepSkipped => "step_skipped",
            LogEvent::PlanTransition => "plan_transition",
        }
    }

    /// True for events that describe the outcome of an attempt.
    pub fn is_attempt(&self) -> bool {
        matches!(self, LogEvent::AttemptSucceeded | LogEvent::AttemptFailed)
    }
}

impl FromStr for LogEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attempt_succeeded" => Ok(LogEvent::AttemptSucceeded),
            "attempt_failed" => Ok(LogEvent::AttemptFailed),
            "step_skipped" => Ok(LogEvent::StepSkipped),
            "plan_transition" => Ok(LogEvent::PlanTransition),
            _ => Err(format!("Invalid log event: {s}")),
        }
    }
}

/// One immutable execution log row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: u64,
    pub plan_id: u64,
    /// Absent for plan-scoped events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    pub event: LogEvent,
    pub message: String,
    pub created_at: Timestamp,
}

/// A log entry that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub plan_id: u64,
    pub step_id: Option<u64>,
    pub attempt: Option<u32>,
    pub event: LogEvent,
    pub message: String,
}

impl NewLogEntry {
    /// Entry for the outcome of a step attempt.
    pub fn attempt(
        plan_id: u64,
        step_id: u64,
        attempt: u32,
        event: LogEvent,
        message: impl Into<String>,
    ) -> Self {
        Self {
            plan_id,
            step_id: Some(step_id),
            attempt: Some(attempt),
            event,
            message: message.into(),
        }
    }

    /// Plan-scoped entry.
    pub fn plan(plan_id: u64, event: LogEvent, message: impl Into<String>) -> Self {
        Self {
            plan_id,
            step_id: None,
            attempt: None,
            event,
            message: message.into(),
        }
    }
}
