//! Run leases.
//!
//! A plan is executed by at most one runner at a time. A runner claims the
//! plan when it starts, refreshes `heartbeat_at` while it works and releases
//! the claim when it stops.
//!
//! A claim whose heartbeat is older than the lease duration belongs to a
//! runner that died without releasing it. The next runner takes the plan
//! over and fails every step the dead runner left `running`, since those
//! attempts can never report back.

use std::time::Duration;

use jiff::Timestamp;
use rusqlite::{params, Connection, OptionalExtension};

use super::{plan_queries::cas_plan_status, step_queries::fail_running_steps_in, utils};
use crate::{
    error::{DatabaseResultExt, EngineError, Result, StepError},
    models::PlanStatus,
};

const SELECT_LEASE_SQL: &str = "SELECT status, runner_id, heartbeat_at FROM plans WHERE id = ?1";
const CLAIM_LEASE_SQL: &str = "UPDATE plans SET runner_id = ?1, heartbeat_at = ?2 WHERE id = ?3";
const RENEW_LEASE_SQL: &str =
    "UPDATE plans SET heartbeat_at = ?1 WHERE id = ?2 AND runner_id = ?3";
const RELEASE_LEASE_SQL: &str =
    "UPDATE plans SET runner_id = NULL, heartbeat_at = NULL WHERE id = ?1 AND runner_id = ?2";

/// How a runner came to own a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunClaim {
    /// The plan was pending and is now running.
    Started,
    /// The plan was left running or paused by a runner that is gone. Steps
    /// that runner had in flight were failed as interrupted.
    Resumed { interrupted: Vec<String> },
}

/// Lease columns of one plan.
struct Lease {
    status: PlanStatus,
    holder: Option<String>,
    heartbeat: Option<Timestamp>,
}

impl super::Database {
    /// Takes ownership of a plan for `runner`.
    ///
    /// A pending plan moves to `running`. A running or paused plan is only
    /// taken over when nobody holds it or the holder's heartbeat is older
    /// than `lease`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PlanLeased` if another runner holds a live lease
    /// Returns `EngineError::InvalidTransition` if the plan already finished
    /// Returns `EngineError::PlanNotFound` if the plan does not exist
    pub fn claim_plan(&mut self, id: u64, runner: &str, lease: Duration) -> Result<RunClaim> {
        let tx = self.begin_write()?;
        let current = lease_in(&tx, id)?;
        let now = Timestamp::now();

        let claim = match current.status {
            PlanStatus::Running | PlanStatus::Paused => {
                if let (Some(holder), Some(heartbeat)) = (current.holder, current.heartbeat) {
                    if !expired(heartbeat, now, lease) {
                        return Err(EngineError::PlanLeased { id, runner: holder });
                    }
                    log::warn!("Plan {id}: lease held by {holder} expired; taking over");
                }
                let interrupted = fail_running_steps_in(&tx, id, &StepError::Interrupted)?;
                RunClaim::Resumed { interrupted }
            }
            // Pending, or a finished plan the state machine turns away
            other => {
                cas_plan_status(&tx, id, other, PlanStatus::Running)?;
                RunClaim::Started
            }
        };

        tx.execute(CLAIM_LEASE_SQL, params![runner, now.to_string(), id as i64])
            .db_context("Failed to claim plan")?;
        tx.commit().db_context("Failed to commit transaction")?;

        log::debug!("Plan {id} claimed by {runner}");
        Ok(claim)
    }

    /// Refreshes the heartbeat. Returns `false` if `runner` no longer holds
    /// the plan.
    pub fn renew_lease(&mut self, id: u64, runner: &str) -> Result<bool> {
        let tx = self.begin_write()?;
        let rows = tx
            .execute(
                RENEW_LEASE_SQL,
                params![Timestamp::now().to_string(), id as i64, runner],
            )
            .db_context("Failed to renew lease")?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(rows > 0)
    }

    /// Gives up the plan if `runner` still holds it.
    pub fn release_lease(&mut self, id: u64, runner: &str) -> Result<()> {
        let tx = self.begin_write()?;
        tx.execute(RELEASE_LEASE_SQL, params![id as i64, runner])
            .db_context("Failed to release lease")?;
        tx.commit().db_context("Failed to commit transaction")
    }
}

fn lease_in(conn: &Connection, id: u64) -> Result<Lease> {
    conn.query_row(SELECT_LEASE_SQL, params![id as i64], |row| {
        Ok(Lease {
            status: utils::parsed(row, 0)?,
            holder: row.get(1)?,
            heartbeat: utils::optional_timestamp(row, 2)?,
        })
    })
    .optional()
    .db_context("Failed to query plan lease")?
    .ok_or(EngineError::PlanNotFound { id })
}

fn expired(heartbeat: Timestamp, now: Timestamp, lease: Duration) -> bool {
    let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
    now.as_millisecond() - heartbeat.as_millisecond() >= lease_ms
}
