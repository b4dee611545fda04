//! Plan execution.
//!
//! A run first claims the plan's lease, so only one runner executes a plan
//! at a time. It then resolves the plan into execution groups once and walks
//! the groups in order. Steps of a group run concurrently on a bounded worker
//! pool. A failed step skips its transitive dependents and the rest of the
//! plan carries on; a worker that panics fails its own step and nothing else.
//!
//! A watcher task renews the lease and polls the plan status every polling
//! interval, so an operator's cancellation reaches the run within one tick.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{
    sync::Semaphore,
    task::{Id, JoinError, JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::EngineConfig,
    db::lease_queries::RunClaim,
    dispatcher::{Dispatcher, ExecutionContext, StepInvocation},
    error::{EngineError, Result, StepError},
    models::{LogEvent, NewLogEntry, PlanStatus, Step, StepStatus},
    resolver::{self, DependentIndex, StepNode},
    retry::{run_with_retry, AttemptOutcome, AttemptRecorder, RetryPolicy},
    state,
    store::Store,
};

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub plan_id: u64,
    pub status: PlanStatus,
    pub progress: f64,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    /// Aggregated `{completed, failed, skipped}` result stored on the plan
    pub final_result: Value,
}

/// How one step ended inside a group.
#[derive(Debug)]
enum StepOutcome {
    Completed(Value),
    Failed(String),
    /// Cancellation arrived before the step could start
    NotStarted,
    /// The store rejected a write; the run cannot continue safely
    Aborted(EngineError),
}

/// Executes plans against a store and a dispatcher.
#[derive(Clone)]
pub struct Scheduler {
    store: Store,
    dispatcher: Dispatcher,
    policy: Arc<RetryPolicy>,
    max_concurrency: usize,
    poll_interval: Duration,
    lease_ttl: Duration,
}

impl Scheduler {
    pub fn new(
        store: Store,
        dispatcher: Dispatcher,
        policy: RetryPolicy,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            policy: Arc::new(policy),
            max_concurrency: config.max_concurrency.max(1),
            poll_interval: config.poll_interval(),
            lease_ttl: config.lease_ttl(),
        }
    }

    /// Runs a plan until every step is settled or the plan is cancelled.
    ///
    /// A plan that another live runner is executing is refused with
    /// `EngineError::PlanLeased`. A plan left `running` or `paused` by a
    /// runner that stopped heartbeating is taken over: the steps it had in
    /// flight are failed as interrupted and the rest of the plan continues.
    pub async fn run(&self, plan_id: u64) -> Result<RunReport> {
        let plan = self.store.require_plan(plan_id).await?;
        let runner = runner_id();

        match self
            .store
            .claim_plan(plan_id, runner.clone(), self.lease_ttl)
            .await?
        {
            RunClaim::Started => {}
            RunClaim::Resumed { interrupted } if interrupted.is_empty() => {
                log::info!("Resuming plan {plan_id}");
            }
            RunClaim::Resumed { interrupted } => log::warn!(
                "Resuming plan {plan_id}; interrupted step(s) failed: {}",
                interrupted.join(", ")
            ),
        }
        log::info!("Running plan {plan_id} as {runner}: {}", plan.goal);

        let cancel = CancellationToken::new();
        let stop_watcher = CancellationToken::new();
        let watcher =
            self.spawn_watcher(plan_id, runner.clone(), cancel.clone(), stop_watcher.clone());

        let report = match self.execute(plan_id, &plan.goal, &cancel).await {
            Ok(()) => self.finish(plan_id, &cancel).await,
            Err(e) => Err(e),
        };

        stop_watcher.cancel();
        if let Err(e) = watcher.await {
            log::warn!("Status watcher for plan {plan_id} ended abnormally: {e}");
        }
        if let Err(e) = self.store.release_lease(plan_id, runner).await {
            log::warn!("Failed to release lease on plan {plan_id}: {e}");
        }

        report
    }

    async fn execute(&self, plan_id: u64, goal: &str, cancel: &CancellationToken) -> Result<()> {
        let steps = self.store.get_steps(plan_id).await?;
        let nodes: Vec<StepNode> = steps.iter().map(StepNode::from).collect();
        let groups = resolver::resolve(&nodes)?;
        let dependents = DependentIndex::new(&nodes);

        let mut statuses: HashMap<String, StepStatus> =
            steps.iter().map(|s| (s.key.clone(), s.status)).collect();
        let mut results: HashMap<String, Value> = steps
            .iter()
            .filter_map(|s| s.result.clone().map(|r| (s.key.clone(), r)))
            .collect();
        let steps: HashMap<String, Step> = steps.into_iter().map(|s| (s.key.clone(), s)).collect();

        // Failures from an earlier, interrupted run still block their dependents.
        let failed: Vec<String> = statuses
            .iter()
            .filter(|(_, status)| **status == StepStatus::Failed)
            .map(|(key, _)| key.clone())
            .collect();
        for key in failed {
            self.skip_dependents(plan_id, &key, &dependents, &mut statuses)
                .await?;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        for group in &groups {
            if !self.wait_while_paused(plan_id, cancel).await? {
                break;
            }

            let eligible: Vec<&Step> = group
                .steps
                .iter()
                .filter(|key| statuses.get(*key) == Some(&StepStatus::Pending))
                .filter_map(|key| steps.get(key))
                .filter(|step| {
                    step.depends_on
                        .iter()
                        .all(|dep| statuses.get(dep) == Some(&StepStatus::Completed))
                })
                .collect();
            if eligible.is_empty() {
                continue;
            }
            log::debug!(
                "Plan {plan_id}: starting group {} with {} step(s)",
                group.ordinal,
                eligible.len()
            );

            let mut workers = JoinSet::new();
            let mut spawned: HashMap<Id, String> = HashMap::new();
            for step in eligible {
                let ctx = ExecutionContext {
                    plan_id,
                    goal: goal.to_string(),
                    dependency_results: step
                        .depends_on
                        .iter()
                        .filter_map(|dep| results.get(dep).map(|r| (dep.clone(), r.clone())))
                        .collect(),
                    cancel: cancel.clone(),
                };
                let scheduler = self.clone();
                let semaphore = Arc::clone(&semaphore);
                let key = step.key.clone();
                let worker = workers.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (key, StepOutcome::NotStarted);
                    };
                    let outcome = scheduler.run_step(&key, ctx).await;
                    (key, outcome)
                });
                spawned.insert(worker.id(), step.key.clone());
            }

            let mut aborted = None;
            while let Some(joined) = workers.join_next_with_id().await {
                let (key, outcome) = match joined {
                    Ok((_, settled)) => settled,
                    Err(error) => {
                        let Some(key) = spawned.remove(&error.id()) else {
                            return Err(EngineError::join(error));
                        };
                        let outcome = self.settle_crashed(plan_id, &key, error).await;
                        (key, outcome)
                    }
                };
                match outcome {
                    StepOutcome::Completed(value) => {
                        statuses.insert(key.clone(), StepStatus::Completed);
                        results.insert(key, value);
                    }
                    StepOutcome::Failed(error) => {
                        log::error!("Plan {plan_id}: step '{key}' failed: {error}");
                        statuses.insert(key.clone(), StepStatus::Failed);
                        self.skip_dependents(plan_id, &key, &dependents, &mut statuses)
                            .await?;
                    }
                    StepOutcome::NotStarted => {}
                    StepOutcome::Aborted(e) => {
                        log::error!("Plan {plan_id}: step '{key}' aborted: {e}");
                        aborted.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = aborted {
                return Err(e);
            }
        }

        let reason = if cancel.is_cancelled() {
            "plan cancelled before the step started"
        } else {
            "step was never reached"
        };
        let mut leftover: Vec<&Step> = statuses
            .iter()
            .filter(|(_, status)| **status == StepStatus::Pending)
            .filter_map(|(key, _)| steps.get(key))
            .collect();
        leftover.sort_by_key(|s| s.index);
        for step in leftover {
            log::warn!("Plan {plan_id}: skipping '{}': {reason}", step.key);
            self.store
                .skip_step(plan_id, step.key.clone(), reason.to_string())
                .await?;
        }

        Ok(())
    }

    /// Executes one step: claim, retry around the dispatcher, settle.
    async fn run_step(&self, key: &str, ctx: ExecutionContext) -> StepOutcome {
        let plan_id = ctx.plan_id;

        let step = loop {
            match self.wait_while_paused(plan_id, &ctx.cancel).await {
                Ok(true) => {}
                Ok(false) => return StepOutcome::NotStarted,
                Err(e) => return StepOutcome::Aborted(e),
            }
            match self.store.start_step(plan_id, key.to_string()).await {
                Ok(step) => break step,
                // Paused or cancelled between the check above and the claim
                Err(EngineError::PlanNotRunning { status, .. }) => {
                    log::debug!("Plan {plan_id}: step '{key}' held back, plan is {status}");
                    if status != PlanStatus::Paused {
                        ctx.cancel.cancel();
                        return StepOutcome::NotStarted;
                    }
                }
                Err(e) => return StepOutcome::Aborted(e),
            }
        };
        log::debug!("Plan {plan_id}: step '{key}' started");

        let recorder = StepRecorder {
            store: self.store.clone(),
            plan_id,
            step_id: step.id,
            key: key.to_string(),
        };
        let cancel = ctx.cancel.clone();
        let ctx = Arc::new(ctx);
        let step = Arc::new(step);

        let outcome = run_with_retry(
            key,
            |attempt| {
                let dispatcher = self.dispatcher.clone();
                let invocation = StepInvocation::from_step(&step, attempt);
                let ctx = Arc::clone(&ctx);
                async move {
                    dispatcher
                        .dispatch(&invocation, &ctx)
                        .await
                        .map(|result| result.to_value())
                }
            },
            &self.policy,
            &recorder,
            &cancel,
        )
        .await;

        match outcome {
            Ok(success) => {
                match self
                    .store
                    .complete_step(plan_id, key.to_string(), success.attempts, success.value.clone())
                    .await
                {
                    Ok(progress) => {
                        log::debug!("Plan {plan_id}: step '{key}' completed ({progress:.0}%)");
                        StepOutcome::Completed(success.value)
                    }
                    Err(e) => StepOutcome::Aborted(e),
                }
            }
            Err(failure) => {
                let message = failure.to_string();
                let attempt = failure.attempts().unwrap_or(1);
                match self
                    .store
                    .fail_step(plan_id, key.to_string(), attempt, message.clone())
                    .await
                {
                    Ok(()) => StepOutcome::Failed(message),
                    Err(e) => StepOutcome::Aborted(e),
                }
            }
        }
    }

    /// Settles a step whose worker task panicked.
    async fn settle_crashed(&self, plan_id: u64, key: &str, error: JoinError) -> StepOutcome {
        let error = crash_error(error);
        match self
            .store
            .fail_abandoned_step(plan_id, key.to_string(), error.clone())
            .await
        {
            Ok(StepStatus::Failed) => StepOutcome::Failed(error.to_string()),
            Ok(_) => StepOutcome::NotStarted,
            Err(e) => StepOutcome::Aborted(e),
        }
    }

    async fn skip_dependents(
        &self,
        plan_id: u64,
        failed: &str,
        dependents: &DependentIndex,
        statuses: &mut HashMap<String, StepStatus>,
    ) -> Result<()> {
        for dependent in dependents.transitive_dependents(failed) {
            if statuses.get(&dependent) != Some(&StepStatus::Pending) {
                continue;
            }
            log::warn!("Plan {plan_id}: skipping '{dependent}' because '{failed}' failed");
            self.store
                .skip_step(
                    plan_id,
                    dependent.clone(),
                    format!("dependency '{failed}' failed"),
                )
                .await?;
            statuses.insert(dependent, StepStatus::Skipped);
        }
        Ok(())
    }

    /// Blocks while the plan is paused. Returns `false` once the plan is
    /// cancelled.
    async fn wait_while_paused(&self, plan_id: u64, cancel: &CancellationToken) -> Result<bool> {
        let mut announced = false;
        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            match self.store.plan_status(plan_id).await? {
                PlanStatus::Paused => {
                    if !announced {
                        log::info!("Plan {plan_id} is paused; waiting");
                        announced = true;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(false),
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                PlanStatus::Cancelled => {
                    cancel.cancel();
                    return Ok(false);
                }
                _ => return Ok(true),
            }
        }
    }

    /// Renews the lease and watches for cancellation until `stop` fires.
    fn spawn_watcher(
        &self,
        plan_id: u64,
        runner: String,
        cancel: CancellationToken,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let store = self.store.clone();
        let interval = self.poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }

                match store.renew_lease(plan_id, runner.clone()).await {
                    Ok(true) => {}
                    Ok(false) if !cancel.is_cancelled() => {
                        log::error!("Plan {plan_id}: {runner} lost its lease; stopping");
                        cancel.cancel();
                    }
                    Ok(false) => {}
                    Err(e) => log::warn!("Failed to renew lease on plan {plan_id}: {e}"),
                }

                match store.plan_status(plan_id).await {
                    Ok(PlanStatus::Cancelled) if !cancel.is_cancelled() => {
                        log::info!("Plan {plan_id} cancelled; no new steps will start");
                        cancel.cancel();
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("Failed to poll status of plan {plan_id}: {e}"),
                }
            }
        })
    }

    /// Derives and stores the final status and aggregated result.
    async fn finish(&self, plan_id: u64, cancel: &CancellationToken) -> Result<RunReport> {
        // A pause that arrived during the last group still holds the plan.
        self.wait_while_paused(plan_id, cancel).await?;

        let steps = self.store.get_steps(plan_id).await?;
        let final_result = aggregate(&steps);

        let current = self.store.plan_status(plan_id).await?;
        if current == PlanStatus::Running {
            let statuses: Vec<StepStatus> = steps.iter().map(|s| s.status).collect();
            let target = state::derive_plan_status(&statuses);
            match self
                .store
                .finish_plan(plan_id, target, final_result.clone())
                .await
            {
                Ok(()) => {}
                Err(EngineError::StaleTransition { .. })
                    if self.store.plan_status(plan_id).await? == PlanStatus::Cancelled =>
                {
                    self.store
                        .set_final_result(plan_id, final_result.clone())
                        .await?;
                }
                Err(e) => return Err(e),
            }
        } else {
            self.store
                .set_final_result(plan_id, final_result.clone())
                .await?;
        }

        let plan = self.store.require_plan(plan_id).await?;
        log::info!(
            "Plan {plan_id} finished as {} ({:.0}%)",
            plan.status.as_str(),
            plan.progress
        );

        let keys = |status: StepStatus| -> Vec<String> {
            plan.steps
                .iter()
                .filter(|s| s.status == status)
                .map(|s| s.key.clone())
                .collect()
        };
        Ok(RunReport {
            plan_id,
            status: plan.status,
            progress: plan.progress,
            completed: keys(StepStatus::Completed),
            failed: keys(StepStatus::Failed),
            skipped: keys(StepStatus::Skipped),
            final_result,
        })
    }
}

/// Identifies one run in the lease columns.
fn runner_id() -> String {
    format!("runner-{}-{:08x}", std::process::id(), fastrand::u32(..))
}

/// Turns a dead worker into the error persisted against its step.
fn crash_error(error: JoinError) -> StepError {
    let message = if error.is_panic() {
        let payload = error.into_panic();
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        format!("handler panicked: {detail}")
    } else {
        format!("worker stopped: {error}")
    };
    StepError::Fatal { message }
}

/// Builds `{completed: {key: result}, failed: {key: error}, skipped: [key]}`.
fn aggregate(steps: &[Step]) -> Value {
    let mut completed = Map::new();
    let mut failed = Map::new();
    let mut skipped = Vec::new();

    for step in steps {
        match step.status {
            StepStatus::Completed => {
                completed.insert(step.key.clone(), step.result.clone().unwrap_or(Value::Null));
            }
            StepStatus::Failed => {
                failed.insert(
                    step.key.clone(),
                    Value::String(step.error.clone().unwrap_or_default()),
                );
            }
            StepStatus::Skipped => skipped.push(Value::String(step.key.clone())),
            StepStatus::Pending | StepStatus::Running => {}
        }
    }

    json!({ "completed": completed, "failed": failed, "skipped": skipped })
}

/// Writes attempt outcomes of one step to the execution log.
struct StepRecorder {
    store: Store,
    plan_id: u64,
    step_id: u64,
    key: String,
}

#[async_trait]
impl AttemptRecorder for StepRecorder {
    async fn record_attempt(&self, attempt: u32, outcome: AttemptOutcome<'_>) -> Result<()> {
        let (event, message) = match outcome {
            AttemptOutcome::Succeeded => (
                LogEvent::AttemptSucceeded,
                format!("attempt {attempt} succeeded"),
            ),
            AttemptOutcome::Failed(error) => (
                LogEvent::AttemptFailed,
                format!("attempt {attempt} failed [{}]: {error}", error.kind()),
            ),
        };
        self.store
            .append_log(NewLogEntry::attempt(
                self.plan_id,
                self.step_id,
                attempt,
                event,
                message,
            ))
            .await?;
        Ok(())
    }

    async fn on_retry(&self, next_attempt: u32) -> Result<()> {
        let retries = self
            .store
            .increment_retry(self.plan_id, self.key.clone())
            .await?;
        log::debug!(
            "Step '{}': starting attempt {next_attempt} (retry {retries})",
            self.key
        );
        Ok(())
    }
}
