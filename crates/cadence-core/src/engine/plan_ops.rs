//! Plan submission, execution, queries and control.

use serde_json::Value;

use super::Engine;
use crate::{
    error::{EngineError, Result},
    models::{Plan, PlanFilter, PlanStatus, PlanStatusReport, PlanSummary},
    scheduler::RunReport,
    validator::ValidatedPlan,
};

impl Engine {
    /// Validates a plan document without persisting anything.
    pub fn validate_plan(&self, document: &Value) -> Result<ValidatedPlan> {
        self.validator.validate(document).map_err(|e| {
            log::warn!("Rejected plan ({}): {e}", e.reason_code());
            EngineError::from(e)
        })
    }

    /// Validates and persists a plan. Returns the new plan id.
    ///
    /// A rejected document leaves the store untouched.
    pub async fn submit_plan(&self, document: &Value) -> Result<u64> {
        let validated = self.validate_plan(document)?;
        let plan = self.store.create_plan(validated).await?;
        log::info!(
            "Submitted plan {} with {} step(s): {}",
            plan.id,
            plan.total_steps,
            plan.goal
        );
        Ok(plan.id)
    }

    /// Runs a plan to a terminal status.
    pub async fn run_plan(&self, plan_id: u64) -> Result<RunReport> {
        self.scheduler.run(plan_id).await
    }

    /// Submits a plan and runs it immediately.
    pub async fn submit_and_run(&self, document: &Value) -> Result<RunReport> {
        let plan_id = self.submit_plan(document).await?;
        self.run_plan(plan_id).await
    }

    /// Retrieves a plan with all of its steps.
    pub async fn get_plan(&self, plan_id: u64) -> Result<Plan> {
        self.store.require_plan(plan_id).await
    }

    /// Current status, progress and per-step statuses. Read-only.
    pub async fn plan_status(&self, plan_id: u64) -> Result<PlanStatusReport> {
        let plan = self.store.require_plan(plan_id).await?;
        Ok(PlanStatusReport::from(&plan))
    }

    /// Lists plan summaries, newest first.
    pub async fn list_plans(&self, filter: PlanFilter) -> Result<Vec<PlanSummary>> {
        self.store.list_plans(filter).await
    }

    /// Requests cancellation. Running steps finish; nothing new starts.
    ///
    /// Returns the status the plan had before it was cancelled.
    pub async fn cancel_plan(&self, plan_id: u64) -> Result<PlanStatus> {
        self.store.cancel_plan(plan_id).await
    }

    /// Stops a running plan from starting further steps.
    pub async fn pause_plan(&self, plan_id: u64) -> Result<()> {
        self.store
            .transition_plan(plan_id, PlanStatus::Running, PlanStatus::Paused)
            .await
    }

    /// Lets a paused plan continue.
    pub async fn resume_plan(&self, plan_id: u64) -> Result<()> {
        self.store
            .transition_plan(plan_id, PlanStatus::Paused, PlanStatus::Running)
            .await
    }

    /// Deletes a plan together with its steps, results and log.
    pub async fn delete_plan(&self, plan_id: u64) -> Result<()> {
        self.store.delete_plan(plan_id).await?;
        log::info!("Deleted plan {plan_id}");
        Ok(())
    }
}
