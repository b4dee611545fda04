//! SQLite persistence for plans, steps, results and the execution log.
//!
//! Every write runs inside a transaction. Status columns are only ever
//! written through compare-and-set updates that have been checked against
//! the state machine in [`crate::state`].

use std::{path::Path, time::Duration};

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::{DatabaseResultExt, Result};

pub mod lease_queries;
pub mod log_queries;
pub mod migrations;
pub mod plan_queries;
pub mod step_queries;
pub mod utils;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection and operations handler.
pub struct Database {
    connection: Connection,
}

impl Database {
    /// Opens a connection and initializes the schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let connection = Connection::open(path).db_context("Failed to open database connection")?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .db_context("Failed to set busy timeout")?;

        let db = Self { connection };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Starts a write transaction that takes the write lock up front, so a
    /// read-then-write sequence never fails with a lock upgrade error.
    fn begin_write(&mut self) -> Result<Transaction<'_>> {
        self.connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .db_context("Failed to begin transaction")
    }
}
