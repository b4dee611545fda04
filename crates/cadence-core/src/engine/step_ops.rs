//! Step-level queries and the audit trail.

use super::Engine;
use crate::{
    error::{EngineError, Result},
    models::{LogEntry, ResultRecord, Step},
};

impl Engine {
    /// Retrieves one step by key.
    pub async fn get_step(&self, plan_id: u64, step_key: &str) -> Result<Step> {
        let plan = self.store.require_plan(plan_id).await?;
        plan.step(step_key)
            .cloned()
            .ok_or_else(|| EngineError::StepNotFound {
                plan_id,
                key: step_key.to_string(),
            })
    }

    /// Attempt outcomes of a step, oldest first.
    pub async fn attempt_history(&self, plan_id: u64, step_key: &str) -> Result<Vec<LogEntry>> {
        self.store
            .attempt_history(plan_id, step_key.to_string())
            .await
    }

    /// Every log entry of a plan, oldest first.
    pub async fn execution_log(&self, plan_id: u64) -> Result<Vec<LogEntry>> {
        self.store.execution_log(plan_id).await
    }

    /// Settled step results of a plan.
    pub async fn results(&self, plan_id: u64) -> Result<Vec<ResultRecord>> {
        self.store.results(plan_id).await
    }
}
