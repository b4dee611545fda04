//! Asynchronous access to the SQLite store.
//!
//! Each operation opens its own [`Database`] connection on the blocking
//! thread pool, so concurrent step workers never share a connection.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde_json::Value;
use tokio::task;

use crate::{
    db::{lease_queries::RunClaim, Database},
    error::{EngineError, Result, StepError},
    models::{
        LogEntry, NewLogEntry, Plan, PlanFilter, PlanStatus, PlanSummary, ResultRecord, Step,
        StepStatus,
    },
    validator::ValidatedPlan,
};

/// Handle to the database file shared by the engine and its workers.
///
/// Holds only the path. Every method hands a closure to
/// `tokio::task::spawn_blocking`, opens a fresh [`Database`] there and runs
/// one synchronous query method on it. SQLite's WAL mode and busy timeout
/// then serialize the writers.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    pub(crate) fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    async fn with_db<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db_path = self.db_path.clone();
        task::spawn_blocking(move || {
            let mut db = Database::new(&db_path)?;
            operation(&mut db)
        })
        .await
        .map_err(EngineError::join)?
    }

    pub async fn create_plan(&self, plan: ValidatedPlan) -> Result<Plan> {
        self.with_db(move |db| db.create_plan(&plan)).await
    }

    pub async fn get_plan(&self, id: u64) -> Result<Option<Plan>> {
        self.with_db(move |db| db.get_plan(id)).await
    }

    /// Like [`Store::get_plan`] but a missing plan is an error.
    pub async fn require_plan(&self, id: u64) -> Result<Plan> {
        self.get_plan(id)
            .await?
            .ok_or(EngineError::PlanNotFound { id })
    }

    pub async fn plan_status(&self, id: u64) -> Result<PlanStatus> {
        self.with_db(move |db| db.plan_status(id)).await
    }

    pub async fn list_plans(&self, filter: PlanFilter) -> Result<Vec<PlanSummary>> {
        self.with_db(move |db| db.list_plans(&filter)).await
    }

    pub async fn transition_plan(&self, id: u64, from: PlanStatus, to: PlanStatus) -> Result<()> {
        self.with_db(move |db| db.transition_plan(id, from, to)).await
    }

    pub async fn cancel_plan(&self, id: u64) -> Result<PlanStatus> {
        self.with_db(move |db| db.cancel_plan(id)).await
    }

    pub async fn finish_plan(&self, id: u64, to: PlanStatus, final_result: Value) -> Result<()> {
        self.with_db(move |db| db.finish_plan(id, to, &final_result))
            .await
    }

    pub async fn set_final_result(&self, id: u64, final_result: Value) -> Result<()> {
        self.with_db(move |db| db.set_final_result(id, &final_result))
            .await
    }

    pub async fn delete_plan(&self, id: u64) -> Result<()> {
        self.with_db(move |db| db.delete_plan(id)).await
    }

    pub async fn get_steps(&self, plan_id: u64) -> Result<Vec<Step>> {
        self.with_db(move |db| db.get_steps(plan_id)).await
    }

    pub async fn start_step(&self, plan_id: u64, key: String) -> Result<Step> {
        self.with_db(move |db| db.start_step(plan_id, &key)).await
    }

    pub async fn complete_step(
        &self,
        plan_id: u64,
        key: String,
        attempt: u32,
        payload: Value,
    ) -> Result<f64> {
        self.with_db(move |db| db.complete_step(plan_id, &key, attempt, &payload))
            .await
    }

    pub async fn fail_step(
        &self,
        plan_id: u64,
        key: String,
        attempt: u32,
        error: String,
    ) -> Result<()> {
        self.with_db(move |db| db.fail_step(plan_id, &key, attempt, &error))
            .await
    }

    pub async fn skip_step(&self, plan_id: u64, key: String, reason: String) -> Result<()> {
        self.with_db(move |db| db.skip_step(plan_id, &key, &reason))
            .await
    }

    pub async fn increment_retry(&self, plan_id: u64, key: String) -> Result<u32> {
        self.with_db(move |db| db.increment_retry(plan_id, &key))
            .await
    }

    pub async fn fail_abandoned_step(
        &self,
        plan_id: u64,
        key: String,
        error: StepError,
    ) -> Result<StepStatus> {
        self.with_db(move |db| db.fail_abandoned_step(plan_id, &key, &error))
            .await
    }

    pub async fn claim_plan(&self, id: u64, runner: String, lease: Duration) -> Result<RunClaim> {
        self.with_db(move |db| db.claim_plan(id, &runner, lease))
            .await
    }

    pub async fn renew_lease(&self, id: u64, runner: String) -> Result<bool> {
        self.with_db(move |db| db.renew_lease(id, &runner)).await
    }

    pub async fn release_lease(&self, id: u64, runner: String) -> Result<()> {
        self.with_db(move |db| db.release_lease(id, &runner)).await
    }

    pub async fn append_log(&self, entry: NewLogEntry) -> Result<u64> {
        self.with_db(move |db| db.append_log(&entry)).await
    }

    pub async fn attempt_history(&self, plan_id: u64, key: String) -> Result<Vec<LogEntry>> {
        self.with_db(move |db| db.attempt_history(plan_id, &key))
            .await
    }

    pub async fn execution_log(&self, plan_id: u64) -> Result<Vec<LogEntry>> {
        self.with_db(move |db| db.execution_log(plan_id)).await
    }

    pub async fn results(&self, plan_id: u64) -> Result<Vec<ResultRecord>> {
        self.with_db(move |db| db.results(plan_id)).await
    }
}
