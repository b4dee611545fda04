//! Summary and status-report views of plans.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{Plan, PlanStatus, StepStatus};

/// Summary information about a plan with step statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanSummary {
    pub id: u64,
    pub goal: String,
    pub status: PlanStatus,
    pub progress: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub total_steps: u32,
    pub completed_steps: u32,
    pub failed_steps: u32,
    pub skipped_steps: u32,
}

impl From<&Plan> for PlanSummary {
    fn from(plan: &Plan) -> Self {
        Self {
            id: plan.id,
            goal: plan.goal.clone(),
            status: plan.status,
            progress: plan.progress,
            created_at: plan.created_at,
            updated_at: plan.updated_at,
            total_steps: plan.total_steps,
            completed_steps: plan.count_steps(StepStatus::Completed) as u32,
            failed_steps: plan.count_steps(StepStatus::Failed) as u32,
            skipped_steps: plan.count_steps(StepStatus::Skipped) as u32,
        }
    }
}

/// Per-step line of a status report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepStatusView {
    pub key: String,
    pub index: u32,
    pub agent_name: String,
    pub status: StepStatus,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Answer of the status query interface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStatusReport {
    pub plan_id: u64,
    pub goal: String,
    pub status: PlanStatus,
    pub progress: f64,
    pub steps: Vec<StepStatusView>,
}

impl From<&Plan> for PlanStatusReport {
    fn from(plan: &Plan) -> Self {
        Self {
            plan_id: plan.id,
            goal: plan.goal.clone(),
            status: plan.status,
            progress: plan.progress,
            steps: plan
                .steps
                .iter()
                .map(|step| StepStatusView {
                    key: step.key.clone(),
                    index: step.index,
                    agent_name: step.agent_name.clone(),
                    status: step.status,
                    retry_count: step.retry_count,
                    error: step.error.clone(),
                })
                .collect(),
        }
    }
}

/// Computes the progress percentage from step counts.
///
/// Plans always have at least one step, but a zero total yields 0 rather
/// than NaN.
pub fn progress_percentage(completed: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(completed) * 100.0 / f64::from(total)
    }
}
