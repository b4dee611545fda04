//! Step queries and checked step transitions.

use jiff::Timestamp;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value};

use super::{
    log_queries::insert_log,
    plan_queries::{plan_exists, plan_status_in, recompute_progress_in},
    utils,
};
use crate::{
    error::{DatabaseResultExt, EngineError, Result, StepError},
    models::{LogEvent, NewLogEntry, PlanStatus, ResultOutcome, Step, StepStatus},
    state::{self, EntityRef},
};

const STEP_COLUMNS: &str = "id, plan_id, step_key, step_index, step_type, agent_name, parameters, depends_on, parallel_group, status, retry_count, started_at, completed_at, result, error, created_at, updated_at";
const SELECT_STEP_STATUS_SQL: &str =
    "SELECT status FROM steps WHERE plan_id = ?1 AND step_key = ?2";
const START_STEP_SQL: &str = "UPDATE steps SET status = 'running', started_at = ?1, updated_at = ?1 WHERE plan_id = ?2 AND step_key = ?3 AND status = 'pending' AND EXISTS (SELECT 1 FROM plans WHERE id = ?2 AND status = 'running')";
const COMPLETE_STEP_SQL: &str = "UPDATE steps SET status = 'completed', result = ?1, error = NULL, completed_at = ?2, updated_at = ?2 WHERE plan_id = ?3 AND step_key = ?4 AND status = 'running'";
const FAIL_STEP_SQL: &str = "UPDATE steps SET status = 'failed', error = ?1, completed_at = ?2, updated_at = ?2 WHERE plan_id = ?3 AND step_key = ?4 AND status = 'running'";
const SKIP_STEP_SQL: &str = "UPDATE steps SET status = 'skipped', error = ?1, completed_at = ?2, updated_at = ?2 WHERE plan_id = ?3 AND step_key = ?4 AND status = 'pending'";
const INCREMENT_RETRY_SQL: &str = "UPDATE steps SET retry_count = retry_count + 1, updated_at = ?1 WHERE plan_id = ?2 AND step_key = ?3 AND status = 'running'";
const SELECT_RUNNING_STEPS_SQL: &str = "SELECT step_key FROM steps WHERE plan_id = ?1 AND status = 'running' ORDER BY step_index";
const INSERT_RESULT_SQL: &str = "INSERT INTO results (plan_id, step_id, attempt, outcome, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

impl super::Database {
    /// Constructs a Step from a row selected with `STEP_COLUMNS`.
    fn build_step_from_row(row: &rusqlite::Row) -> rusqlite::Result<Step> {
        Ok(Step {
            id: utils::id(row, 0)?,
            plan_id: utils::id(row, 1)?,
            key: row.get(2)?,
            index: row.get::<_, i64>(3)? as u32,
            step_type: row.get(4)?,
            agent_name: row.get(5)?,
            parameters: utils::json(row, 6)?,
            depends_on: utils::json(row, 7)?,
            parallel_group: row.get(8)?,
            status: utils::parsed(row, 9)?,
            retry_count: row.get::<_, i64>(10)? as u32,
            started_at: utils::optional_timestamp(row, 11)?,
            completed_at: utils::optional_timestamp(row, 12)?,
            result: utils::optional_json(row, 13)?,
            error: row.get(14)?,
            created_at: utils::timestamp(row, 15)?,
            updated_at: utils::timestamp(row, 16)?,
        })
    }

    /// All steps of a plan ordered by index.
    pub fn get_steps(&self, plan_id: u64) -> Result<Vec<Step>> {
        let mut stmt = self
            .connection
            .prepare(&format!(
                "SELECT {STEP_COLUMNS} FROM steps WHERE plan_id = ?1 ORDER BY step_index"
            ))
            .db_context("Failed to prepare query")?;

        let steps = stmt
            .query_map(params![plan_id as i64], Self::build_step_from_row)
            .db_context("Failed to query steps")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context("Failed to read steps")?;
        Ok(steps)
    }

    /// Looks up a single step by its key.
    pub fn get_step(&self, plan_id: u64, key: &str) -> Result<Step> {
        step_in(&self.connection, plan_id, key)
    }

    /// Moves a pending step to `running` and stamps `started_at`.
    ///
    /// The step only starts while its plan is `running`; the plan status is
    /// checked by the same statement that claims the step, so a pause or
    /// cancellation committed just before wins.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PlanNotRunning` if the plan is paused, cancelled
    /// or otherwise not running
    /// Returns `EngineError::StaleTransition` if the step is no longer pending
    pub fn start_step(&mut self, plan_id: u64, key: &str) -> Result<Step> {
        let tx = self.begin_write()?;

        state::transition_step(plan_id, key, StepStatus::Pending, StepStatus::Running)?;
        let rows = tx
            .execute(
                START_STEP_SQL,
                params![Timestamp::now().to_string(), plan_id as i64, key],
            )
            .db_context("Failed to start step")?;
        if rows == 0 {
            let status =
                plan_status_in(&tx, plan_id)?.ok_or(EngineError::PlanNotFound { id: plan_id })?;
            if status != PlanStatus::Running {
                return Err(EngineError::PlanNotRunning {
                    id: plan_id,
                    status,
                });
            }
        }
        ensure_step_updated(&tx, rows, plan_id, key, StepStatus::Pending, StepStatus::Running)?;

        let step = step_in(&tx, plan_id, key)?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(step)
    }

    /// Settles a running step as `completed`, appends its success record and
    /// refreshes plan progress. Returns the new progress.
    pub fn complete_step(
        &mut self,
        plan_id: u64,
        key: &str,
        attempt: u32,
        payload: &Value,
    ) -> Result<f64> {
        let tx = self.begin_write()?;

        state::transition_step(plan_id, key, StepStatus::Running, StepStatus::Completed)?;
        let now = Timestamp::now().to_string();
        let text = serde_json::to_string(payload)?;
        let rows = tx
            .execute(COMPLETE_STEP_SQL, params![text, &now, plan_id as i64, key])
            .db_context("Failed to complete step")?;
        ensure_step_updated(
            &tx,
            rows,
            plan_id,
            key,
            StepStatus::Running,
            StepStatus::Completed,
        )?;

        let step_id = step_id_in(&tx, plan_id, key)?;
        insert_result(&tx, plan_id, step_id, attempt, ResultOutcome::Success, &text, &now)?;
        let progress = recompute_progress_in(&tx, plan_id)?;

        tx.commit().db_context("Failed to commit transaction")?;
        Ok(progress)
    }

    /// Settles a running step as `failed` and appends its failure record.
    pub fn fail_step(&mut self, plan_id: u64, key: &str, attempt: u32, error: &str) -> Result<()> {
        let tx = self.begin_write()?;
        fail_step_in(&tx, plan_id, key, attempt, error)?;
        recompute_progress_in(&tx, plan_id)?;
        tx.commit().db_context("Failed to commit transaction")
    }

    /// Marks a pending step as `skipped` and logs why.
    pub fn skip_step(&mut self, plan_id: u64, key: &str, reason: &str) -> Result<()> {
        let tx = self.begin_write()?;

        state::transition_step(plan_id, key, StepStatus::Pending, StepStatus::Skipped)?;
        let rows = tx
            .execute(
                SKIP_STEP_SQL,
                params![reason, Timestamp::now().to_string(), plan_id as i64, key],
            )
            .db_context("Failed to skip step")?;
        ensure_step_updated(&tx, rows, plan_id, key, StepStatus::Pending, StepStatus::Skipped)?;

        let step_id = step_id_in(&tx, plan_id, key)?;
        insert_log(
            &tx,
            &NewLogEntry {
                plan_id,
                step_id: Some(step_id),
                attempt: None,
                event: LogEvent::StepSkipped,
                message: reason.to_string(),
            },
        )?;

        tx.commit().db_context("Failed to commit transaction")
    }

    /// Increments the retry counter of a running step and returns it.
    pub fn increment_retry(&mut self, plan_id: u64, key: &str) -> Result<u32> {
        let tx = self.begin_write()?;

        let rows = tx
            .execute(
                INCREMENT_RETRY_SQL,
                params![Timestamp::now().to_string(), plan_id as i64, key],
            )
            .db_context("Failed to increment retry count")?;
        if rows == 0 {
            let step = step_in(&tx, plan_id, key)?;
            return Err(EngineError::StaleTransition {
                entity: EntityRef::Step {
                    plan_id,
                    key: key.to_string(),
                },
                expected: StepStatus::Running.as_str(),
                actual: step.status.as_str().to_string(),
                to: StepStatus::Running.as_str(),
            });
        }

        let step = step_in(&tx, plan_id, key)?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(step.retry_count)
    }

    /// Fails a step whose worker died mid-attempt.
    ///
    /// The attempt that was in flight is logged as failed with `error`, the
    /// same way the retry handler would have logged it. Returns the status the
    /// step ends up in: `failed` if it was running, otherwise unchanged.
    pub fn fail_abandoned_step(
        &mut self,
        plan_id: u64,
        key: &str,
        error: &StepError,
    ) -> Result<StepStatus> {
        let tx = self.begin_write()?;

        let step = step_in(&tx, plan_id, key)?;
        if step.status != StepStatus::Running {
            return Ok(step.status);
        }
        abandon_step_in(&tx, &step, error)?;
        recompute_progress_in(&tx, plan_id)?;

        tx.commit().db_context("Failed to commit transaction")?;
        Ok(StepStatus::Failed)
    }
}

/// Fails every `running` step of a plan with `error`. Returns their keys.
pub(super) fn fail_running_steps_in(
    conn: &Connection,
    plan_id: u64,
    error: &StepError,
) -> Result<Vec<String>> {
    let keys = {
        let mut stmt = conn
            .prepare(SELECT_RUNNING_STEPS_SQL)
            .db_context("Failed to prepare query")?;
        let keys = stmt
            .query_map(params![plan_id as i64], |row| row.get::<_, String>(0))
            .db_context("Failed to query running steps")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context("Failed to read running steps")?;
        keys
    };

    for key in &keys {
        let step = step_in(conn, plan_id, key)?;
        abandon_step_in(conn, &step, error)?;
    }
    if !keys.is_empty() {
        recompute_progress_in(conn, plan_id)?;
    }
    Ok(keys)
}

/// Fails a running step whose attempt will never report back, logging the
/// lost attempt as `retry_count + 1`.
fn abandon_step_in(conn: &Connection, step: &Step, error: &StepError) -> Result<()> {
    let attempt = step.retry_count + 1;
    let message = error.to_string();
    fail_step_in(conn, step.plan_id, &step.key, attempt, &message)?;
    insert_log(
        conn,
        &NewLogEntry::attempt(
            step.plan_id,
            step.id,
            attempt,
            LogEvent::AttemptFailed,
            format!("attempt {attempt} failed [{}]: {message}", error.kind()),
        ),
    )?;
    Ok(())
}

pub(super) fn step_in(conn: &Connection, plan_id: u64, key: &str) -> Result<Step> {
    let step = conn
        .query_row(
            &format!("SELECT {STEP_COLUMNS} FROM steps WHERE plan_id = ?1 AND step_key = ?2"),
            params![plan_id as i64, key],
            super::Database::build_step_from_row,
        )
        .optional()
        .db_context("Failed to query step")?;

    match step {
        Some(step) => Ok(step),
        None if !plan_exists(conn, plan_id)? => Err(EngineError::PlanNotFound { id: plan_id }),
        None => Err(EngineError::StepNotFound {
            plan_id,
            key: key.to_string(),
        }),
    }
}

pub(super) fn step_id_in(conn: &Connection, plan_id: u64, key: &str) -> Result<u64> {
    let id = conn
        .query_row(
            "SELECT id FROM steps WHERE plan_id = ?1 AND step_key = ?2",
            params![plan_id as i64, key],
            |row| utils::id(row, 0),
        )
        .optional()
        .db_context("Failed to query step id")?;
    id.ok_or_else(|| EngineError::StepNotFound {
        plan_id,
        key: key.to_string(),
    })
}

fn fail_step_in(conn: &Connection, plan_id: u64, key: &str, attempt: u32, error: &str) -> Result<()> {
    state::transition_step(plan_id, key, StepStatus::Running, StepStatus::Failed)?;
    let now = Timestamp::now().to_string();
    let rows = conn
        .execute(FAIL_STEP_SQL, params![error, &now, plan_id as i64, key])
        .db_context("Failed to fail step")?;
    ensure_step_updated(conn, rows, plan_id, key, StepStatus::Running, StepStatus::Failed)?;

    let step_id = step_id_in(conn, plan_id, key)?;
    let payload = json!({ "error": error }).to_string();
    insert_result(conn, plan_id, step_id, attempt, ResultOutcome::Failure, &payload, &now)
}

fn insert_result(
    conn: &Connection,
    plan_id: u64,
    step_id: u64,
    attempt: u32,
    outcome: ResultOutcome,
    payload: &str,
    now: &str,
) -> Result<()> {
    conn.execute(
        INSERT_RESULT_SQL,
        params![
            plan_id as i64,
            step_id as i64,
            i64::from(attempt),
            outcome.as_str(),
            payload,
            now
        ],
    )
    .db_context("Failed to insert result record")?;
    Ok(())
}

/// Turns a compare-and-set that touched no rows into the matching error.
fn ensure_step_updated(
    conn: &Connection,
    rows: usize,
    plan_id: u64,
    key: &str,
    from: StepStatus,
    to: StepStatus,
) -> Result<()> {
    if rows > 0 {
        return Ok(());
    }

    let actual: Option<String> = conn
        .query_row(SELECT_STEP_STATUS_SQL, params![plan_id as i64, key], |row| {
            row.get(0)
        })
        .optional()
        .db_context("Failed to query step status")?;

    match actual {
        None => Err(EngineError::StepNotFound {
            plan_id,
            key: key.to_string(),
        }),
        Some(actual) => {
            let err = EngineError::StaleTransition {
                entity: EntityRef::Step {
                    plan_id,
                    key: key.to_string(),
                },
                expected: from.as_str(),
                actual,
                to: to.as_str(),
            };
            log::error!("{err}");
            Err(err)
        }
    }
}
