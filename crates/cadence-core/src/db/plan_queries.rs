//! Plan creation, queries and status transitions.

use jiff::Timestamp;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::utils;
use crate::{
    error::{DatabaseResultExt, EngineError, Result},
    models::{progress_percentage, LogEvent, NewLogEntry, Plan, PlanFilter, PlanStatus, PlanSummary},
    state::{self, EntityRef},
    validator::ValidatedPlan,
};

const INSERT_PLAN_SQL: &str = "INSERT INTO plans (goal, status, total_steps, progress, document, created_at, updated_at) VALUES (?1, 'pending', ?2, 0.0, ?3, ?4, ?5)";
const INSERT_STEP_SQL: &str = "INSERT INTO steps (plan_id, step_key, step_index, step_type, agent_name, parameters, depends_on, parallel_group, status, retry_count, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', 0, ?9, ?10)";
const SELECT_PLAN_SQL: &str = "SELECT id, goal, status, total_steps, progress, document, final_result, created_at, updated_at FROM plans WHERE id = ?1";
const SELECT_PLAN_STATUS_SQL: &str = "SELECT status FROM plans WHERE id = ?1";
const CHECK_PLAN_EXISTS_SQL: &str = "SELECT EXISTS(SELECT 1 FROM plans WHERE id = ?1)";
const UPDATE_PLAN_STATUS_SQL: &str =
    "UPDATE plans SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4";
const UPDATE_FINAL_RESULT_SQL: &str =
    "UPDATE plans SET final_result = ?1, updated_at = ?2 WHERE id = ?3";
const COUNT_COMPLETED_SQL: &str = "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) FROM steps WHERE plan_id = ?1";
const UPDATE_PROGRESS_SQL: &str = "UPDATE plans SET progress = ?1, updated_at = ?2 WHERE id = ?3";
const DELETE_PLAN_SQL: &str = "DELETE FROM plans WHERE id = ?1";

const PLAN_SUMMARY_SQL: &str = "SELECT p.id, p.goal, p.status, p.progress, p.created_at, p.updated_at, p.total_steps, \
     (SELECT COUNT(*) FROM steps s WHERE s.plan_id = p.id AND s.status = 'completed'), \
     (SELECT COUNT(*) FROM steps s WHERE s.plan_id = p.id AND s.status = 'failed'), \
     (SELECT COUNT(*) FROM steps s WHERE s.plan_id = p.id AND s.status = 'skipped') \
     FROM plans p";

impl super::Database {
    /// Persists a validated plan and all of its steps in one transaction.
    pub fn create_plan(&mut self, plan: &ValidatedPlan) -> Result<Plan> {
        let tx = self.begin_write()?;

        let now = Timestamp::now().to_string();
        let document = serde_json::to_string(&plan.document)?;

        tx.execute(
            INSERT_PLAN_SQL,
            params![plan.goal, plan.steps.len() as i64, document, &now, &now],
        )
        .db_context("Failed to insert plan")?;
        let plan_id = tx.last_insert_rowid();

        for (index, step) in plan.steps.iter().enumerate() {
            let parameters = serde_json::to_string(&step.parameters)?;
            let depends_on = serde_json::to_string(&step.depends_on)?;
            tx.execute(
                INSERT_STEP_SQL,
                params![
                    plan_id,
                    step.id,
                    index as i64,
                    step.step_type,
                    step.agent_name,
                    parameters,
                    depends_on,
                    step.parallel_group,
                    &now,
                    &now
                ],
            )
            .db_context("Failed to insert step")?;
        }

        tx.commit().db_context("Failed to commit transaction")?;

        let id = plan_id as u64;
        self.get_plan(id)?.ok_or(EngineError::PlanNotFound { id })
    }

    /// Retrieves a plan with its steps.
    pub fn get_plan(&self, id: u64) -> Result<Option<Plan>> {
        let plan = self
            .connection
            .query_row(SELECT_PLAN_SQL, params![id as i64], |row| {
                Ok(Plan {
                    id: utils::id(row, 0)?,
                    goal: row.get(1)?,
                    status: utils::parsed(row, 2)?,
                    total_steps: row.get::<_, i64>(3)? as u32,
                    progress: row.get(4)?,
                    document: utils::json(row, 5)?,
                    final_result: utils::optional_json(row, 6)?,
                    created_at: utils::timestamp(row, 7)?,
                    updated_at: utils::timestamp(row, 8)?,
                    steps: Vec::new(),
                })
            })
            .optional()
            .db_context("Failed to query plan")?;

        match plan {
            Some(mut plan) => {
                plan.steps = self.get_steps(plan.id)?;
                Ok(Some(plan))
            }
            None => Ok(None),
        }
    }

    /// Reads only the status column of a plan.
    pub fn plan_status(&self, id: u64) -> Result<PlanStatus> {
        plan_status_in(&self.connection, id)?.ok_or(EngineError::PlanNotFound { id })
    }

    /// Lists plan summaries, newest first.
    pub fn list_plans(&self, filter: &PlanFilter) -> Result<Vec<PlanSummary>> {
        let mut query = PLAN_SUMMARY_SQL.to_string();
        let mut conditions = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("p.status = ?");
            params_vec.push(Box::new(status.as_str()));
        }
        if let Some(ref goal) = filter.goal_contains {
            conditions.push("p.goal LIKE ?");
            params_vec.push(Box::new(format!("%{goal}%")));
        }
        if let Some(after) = filter.created_after {
            conditions.push("p.created_at >= ?");
            params_vec.push(Box::new(after.to_string()));
        }

        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(" ORDER BY p.created_at DESC, p.id DESC");
        if let Some(limit) = filter.limit {
            query.push_str(" LIMIT ?");
            params_vec.push(Box::new(i64::from(limit)));
        }

        let mut stmt = self
            .connection
            .prepare(&query)
            .db_context("Failed to prepare query")?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| &**b).collect();

        let plans = stmt.query_map(&params_refs[..], |row| {
            Ok(PlanSummary {
                id: utils::id(row, 0)?,
                goal: row.get(1)?,
                status: utils::parsed(row, 2)?,
                progress: row.get(3)?,
                created_at: utils::timestamp(row, 4)?,
                updated_at: utils::timestamp(row, 5)?,
                total_steps: row.get::<_, i64>(6)? as u32,
                completed_steps: row.get::<_, i64>(7)? as u32,
                failed_steps: row.get::<_, i64>(8)? as u32,
                skipped_steps: row.get::<_, i64>(9)? as u32,
            })
        })
        .db_context("Failed to query plans")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .db_context("Failed to read plan summaries")?;
        Ok(plans)
    }

    /// Applies a single checked plan transition.
    pub fn transition_plan(&mut self, id: u64, from: PlanStatus, to: PlanStatus) -> Result<()> {
        let tx = self.begin_write()?;
        cas_plan_status(&tx, id, from, to)?;
        tx.commit().db_context("Failed to commit transaction")
    }

    /// Cancels a plan from whatever non-terminal status it is in.
    ///
    /// A paused plan is resumed and cancelled in the same transaction, so the
    /// log shows `paused -> running -> cancelled`. Returns the status the plan
    /// had before cancellation.
    pub fn cancel_plan(&mut self, id: u64) -> Result<PlanStatus> {
        let tx = self.begin_write()?;

        let current = plan_status_in(&tx, id)?.ok_or(EngineError::PlanNotFound { id })?;
        match current {
            PlanStatus::Paused => {
                cas_plan_status(&tx, id, PlanStatus::Paused, PlanStatus::Running)?;
                cas_plan_status(&tx, id, PlanStatus::Running, PlanStatus::Cancelled)?;
            }
            other => cas_plan_status(&tx, id, other, PlanStatus::Cancelled)?,
        }

        tx.commit().db_context("Failed to commit transaction")?;
        Ok(current)
    }

    /// Moves a running plan to its final status and stores the aggregated
    /// result in one transaction.
    pub fn finish_plan(&mut self, id: u64, to: PlanStatus, final_result: &Value) -> Result<()> {
        let tx = self.begin_write()?;
        cas_plan_status(&tx, id, PlanStatus::Running, to)?;
        write_final_result(&tx, id, final_result)?;
        tx.commit().db_context("Failed to commit transaction")
    }

    /// Stores the aggregated result without touching the status.
    pub fn set_final_result(&mut self, id: u64, final_result: &Value) -> Result<()> {
        let tx = self.begin_write()?;
        if !plan_exists(&tx, id)? {
            return Err(EngineError::PlanNotFound { id });
        }
        write_final_result(&tx, id, final_result)?;
        tx.commit().db_context("Failed to commit transaction")
    }

    /// Deletes a plan. Steps, results and log rows cascade.
    pub fn delete_plan(&mut self, id: u64) -> Result<()> {
        let tx = self.begin_write()?;

        let rows = tx
            .execute(DELETE_PLAN_SQL, params![id as i64])
            .db_context("Failed to delete plan")?;
        if rows == 0 {
            return Err(EngineError::PlanNotFound { id });
        }

        tx.commit().db_context("Failed to commit transaction")
    }
}

pub(super) fn plan_exists(conn: &Connection, id: u64) -> Result<bool> {
    conn.query_row(CHECK_PLAN_EXISTS_SQL, params![id as i64], |row| row.get(0))
        .db_context("Failed to check plan existence")
}

pub(super) fn plan_status_in(conn: &Connection, id: u64) -> Result<Option<PlanStatus>> {
    conn.query_row(SELECT_PLAN_STATUS_SQL, params![id as i64], |row| {
        utils::parsed::<PlanStatus>(row, 0)
    })
    .optional()
    .db_context("Failed to query plan status")
}

/// Checks the edge against the state machine, then compare-and-sets the
/// status and logs the transition.
pub(super) fn cas_plan_status(
    conn: &Connection,
    id: u64,
    from: PlanStatus,
    to: PlanStatus,
) -> Result<()> {
    if let Err(e) = state::transition_plan(id, from, to) {
        log::error!("{e}");
        return Err(e);
    }

    let now = Timestamp::now().to_string();
    let rows = conn
        .execute(
            UPDATE_PLAN_STATUS_SQL,
            params![to.as_str(), &now, id as i64, from.as_str()],
        )
        .db_context("Failed to update plan status")?;

    if rows == 0 {
        return match plan_status_in(conn, id)? {
            None => Err(EngineError::PlanNotFound { id }),
            Some(actual) => Err(EngineError::StaleTransition {
                entity: EntityRef::Plan(id),
                expected: from.as_str(),
                actual: actual.as_str().to_string(),
                to: to.as_str(),
            }),
        };
    }

    super::log_queries::insert_log(
        conn,
        &NewLogEntry::plan(
            id,
            LogEvent::PlanTransition,
            format!("{} -> {}", from.as_str(), to.as_str()),
        ),
    )?;
    log::info!("Plan {id}: {} -> {}", from.as_str(), to.as_str());
    Ok(())
}

pub(super) fn recompute_progress_in(conn: &Connection, plan_id: u64) -> Result<f64> {
    let (total, completed): (i64, i64) = conn
        .query_row(COUNT_COMPLETED_SQL, params![plan_id as i64], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .db_context("Failed to count steps")?;

    let progress = progress_percentage(completed as u32, total as u32);
    conn.execute(
        UPDATE_PROGRESS_SQL,
        params![progress, Timestamp::now().to_string(), plan_id as i64],
    )
    .db_context("Failed to update plan progress")?;
    Ok(progress)
}

fn write_final_result(conn: &Connection, id: u64, final_result: &Value) -> Result<()> {
    let text = serde_json::to_string(final_result)?;
    conn.execute(
        UPDATE_FINAL_RESULT_SQL,
        params![text, Timestamp::now().to_string(), id as i64],
    )
    .db_context("Failed to store final result")?;
    Ok(())
}
