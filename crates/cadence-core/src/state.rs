//! State machine for plans and steps.
//!
//! Every status write in the store goes through [`transition_plan`] or
//! [`transition_step`] before the compare-and-set `UPDATE` runs, so an illegal
//! edge (for example `completed -> running`) is rejected the same way no
//! matter which component attempted it.
//!
//! ```text
//! plan:  pending -> running -> {completed, failed, cancelled}
//!                   running <-> paused
//!        pending -> cancelled
//!
//! step:  pending -> running -> {completed, failed}
//!        pending -> skipped
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, Result},
    models::{PlanStatus, StepStatus},
};

/// Identifies the entity a transition applies to, for error reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityRef {
    Plan(u64),
    Step { plan_id: u64, key: String },
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Plan(id) => write!(f, "plan {id}"),
            EntityRef::Step { plan_id, key } => write!(f, "step '{key}' of plan {plan_id}"),
        }
    }
}

/// Returns whether the plan edge `from -> to` exists.
pub fn plan_edge_allowed(from: PlanStatus, to: PlanStatus) -> bool {
    use PlanStatus::*;
    matches!(
        (from, to),
        (Pending, Running)
            | (Pending, Cancelled)
            | (Running, Paused)
            | (Paused, Running)
            | (Running, Completed)
            | (Running, Failed)
            | (Running, Cancelled)
    )
}

/// Returns whether the step edge `from -> to` exists.
pub fn step_edge_allowed(from: StepStatus, to: StepStatus) -> bool {
    use StepStatus::*;
    matches!(
        (from, to),
        (Pending, Running) | (Pending, Skipped) | (Running, Completed) | (Running, Failed)
    )
}

/// Validates a plan transition.
pub fn transition_plan(plan_id: u64, from: PlanStatus, to: PlanStatus) -> Result<()> {
    if plan_edge_allowed(from, to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            entity: EntityRef::Plan(plan_id),
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

/// Validates a step transition.
pub fn transition_step(plan_id: u64, key: &str, from: StepStatus, to: StepStatus) -> Result<()> {
    if step_edge_allowed(from, to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            entity: EntityRef::Step {
                plan_id,
                key: key.to_string(),
            },
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

/// Derives the plan status from the aggregate state of its steps.
///
/// - `failed` if any step failed and nothing is pending or running
/// - `completed` if every step is completed or skipped
/// - `running` otherwise
pub fn derive_plan_status(steps: &[StepStatus]) -> PlanStatus {
    let in_progress = steps
        .iter()
        .any(|s| matches!(s, StepStatus::Pending | StepStatus::Running));
    let any_failed = steps.contains(&StepStatus::Failed);

    if any_failed && !in_progress {
        PlanStatus::Failed
    } else if steps
        .iter()
        .all(|s| matches!(s, StepStatus::Completed | StepStatus::Skipped))
    {
        PlanStatus::Completed
    } else {
        PlanStatus::Running
    }
}
