//! Step model definition and related functionality.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StepStatus;

/// Represents an individual step within a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Unique identifier for the step
    pub id: u64,

    /// ID of the parent plan
    pub plan_id: u64,

    /// Step identifier from the plan document, unique within the plan
    pub key: String,

    /// Ordinal position within the plan (0-indexed)
    pub index: u32,

    /// Declared step type
    pub step_type: String,

    /// Name of the handler that executes this step
    pub agent_name: String,

    /// Opaque handler input
    #[serde(default)]
    pub parameters: Value,

    /// Keys of steps that must complete first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Optional grouping tag; concurrency is derived from dependencies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<String>,

    /// Current status of the step
    pub status: StepStatus,

    /// Number of retries performed
    pub retry_count: u32,

    /// When the step entered `running`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,

    /// When the step reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,

    /// Normalized result payload for completed steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Failure description for failed or skipped steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Timestamp when the step was created (UTC)
    pub created_at: Timestamp,

    /// Timestamp when the step was last updated (UTC)
    pub updated_at: Timestamp,
}
