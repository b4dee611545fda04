//! Append-only execution log and result records.

use jiff::Timestamp;
use rusqlite::{params, Connection};

use super::{plan_queries::plan_exists, step_queries::step_in, utils};
use crate::{
    error::{DatabaseResultExt, EngineError, Result},
    models::{LogEntry, NewLogEntry, ResultRecord},
};

const INSERT_LOG_SQL: &str = "INSERT INTO execution_log (plan_id, step_id, attempt, event, message, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
const LOG_COLUMNS: &str =
    "l.id, l.plan_id, l.step_id, s.step_key, l.attempt, l.event, l.message, l.created_at";
const SELECT_ATTEMPTS_SQL: &str = "SELECT l.id, l.plan_id, l.step_id, s.step_key, l.attempt, l.event, l.message, l.created_at FROM execution_log l LEFT JOIN steps s ON s.id = l.step_id WHERE l.step_id = ?1 AND l.event IN ('attempt_succeeded', 'attempt_failed') ORDER BY l.id";
const SELECT_RESULTS_SQL: &str = "SELECT r.id, r.plan_id, r.step_id, s.step_key, r.attempt, r.outcome, r.payload, r.created_at FROM results r JOIN steps s ON s.id = r.step_id WHERE r.plan_id = ?1 ORDER BY r.id";

impl super::Database {
    fn build_log_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<LogEntry> {
        Ok(LogEntry {
            id: utils::id(row, 0)?,
            plan_id: utils::id(row, 1)?,
            step_id: row.get::<_, Option<i64>>(2)?.map(|id| id as u64),
            step_key: row.get(3)?,
            attempt: row.get::<_, Option<i64>>(4)?.map(|a| a as u32),
            event: utils::parsed(row, 5)?,
            message: row.get(6)?,
            created_at: utils::timestamp(row, 7)?,
        })
    }

    /// Appends one log entry and returns its id.
    pub fn append_log(&mut self, entry: &NewLogEntry) -> Result<u64> {
        let tx = self.begin_write()?;
        if !plan_exists(&tx, entry.plan_id)? {
            return Err(EngineError::PlanNotFound { id: entry.plan_id });
        }
        let id = insert_log(&tx, entry)?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(id)
    }

    /// Attempt outcomes of one step in the order they happened.
    pub fn attempt_history(&self, plan_id: u64, key: &str) -> Result<Vec<LogEntry>> {
        let step_id = step_in(&self.connection, plan_id, key)?.id;

        let mut stmt = self
            .connection
            .prepare(SELECT_ATTEMPTS_SQL)
            .db_context("Failed to prepare query")?;
        let history = stmt
            .query_map(params![step_id as i64], Self::build_log_entry_from_row)
            .db_context("Failed to query attempt history")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context("Failed to read attempt history")?;
        Ok(history)
    }

    /// Every log entry of a plan, plan-scoped and step-scoped, oldest first.
    pub fn execution_log(&self, plan_id: u64) -> Result<Vec<LogEntry>> {
        if !plan_exists(&self.connection, plan_id)? {
            return Err(EngineError::PlanNotFound { id: plan_id });
        }

        let mut stmt = self
            .connection
            .prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM execution_log l LEFT JOIN steps s ON s.id = l.step_id WHERE l.plan_id = ?1 ORDER BY l.id"
            ))
            .db_context("Failed to prepare query")?;
        let entries = stmt
            .query_map(params![plan_id as i64], Self::build_log_entry_from_row)
            .db_context("Failed to query execution log")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context("Failed to read execution log")?;
        Ok(entries)
    }

    /// Result records of a plan in insertion order.
    pub fn results(&self, plan_id: u64) -> Result<Vec<ResultRecord>> {
        if !plan_exists(&self.connection, plan_id)? {
            return Err(EngineError::PlanNotFound { id: plan_id });
        }

        let mut stmt = self
            .connection
            .prepare(SELECT_RESULTS_SQL)
            .db_context("Failed to prepare query")?;
        let results = stmt.query_map(params![plan_id as i64], |row| {
            Ok(ResultRecord {
                id: utils::id(row, 0)?,
                plan_id: utils::id(row, 1)?,
                step_id: utils::id(row, 2)?,
                step_key: row.get(3)?,
                attempt: row.get::<_, i64>(4)? as u32,
                outcome: utils::parsed(row, 5)?,
                payload: utils::json(row, 6)?,
                created_at: utils::timestamp(row, 7)?,
            })
        })
        .db_context("Failed to query results")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .db_context("Failed to read results")?;
        Ok(results)
    }
}

pub(super) fn insert_log(conn: &Connection, entry: &NewLogEntry) -> Result<u64> {
    conn.execute(
        INSERT_LOG_SQL,
        params![
            entry.plan_id as i64,
            entry.step_id.map(|id| id as i64),
            entry.attempt.map(i64::from),
            entry.event.as_str(),
            entry.message,
            Timestamp::now().to_string()
        ],
    )
    .db_context("Failed to append execution log entry")?;
    Ok(conn.last_insert_rowid() as u64)
}
