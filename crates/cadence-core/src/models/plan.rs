//! Plan model definition and related functionality.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{PlanStatus, Step, StepStatus};

/// Represents a submitted plan with its steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Unique identifier for the plan
    pub id: u64,

    /// Free-text description of what the plan is meant to achieve
    pub goal: String,

    /// Current lifecycle status
    #[serde(default)]
    pub status: PlanStatus,

    /// Number of steps, fixed at submission
    pub total_steps: u32,

    /// Percentage of completed steps, derived after every settle
    pub progress: f64,

    /// The validated plan document as submitted
    pub document: Value,

    /// Aggregated result, present once the plan is terminal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_result: Option<Value>,

    /// Timestamp when the plan was created (UTC)
    pub created_at: Timestamp,

    /// Timestamp when the plan was last modified (UTC)
    pub updated_at: Timestamp,

    /// Associated steps, ordered by index
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Plan {
    /// Looks up a step by its key.
    pub fn step(&self, key: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.key == key)
    }

    /// Number of steps currently in the given status.
    pub fn count_steps(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|step| step.status == status).count()
    }
}
