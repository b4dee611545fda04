//! Database schema initialization and migrations.

use crate::error::{DatabaseResultExt, Result};

/// Schema version written to `PRAGMA user_version`.
///
/// - 1: plans, steps, results and the execution log
/// - 2: run lease columns on `plans`
const SCHEMA_VERSION: i64 = 2;

const ADD_RUN_LEASE_SQL: &str = "ALTER TABLE plans ADD COLUMN runner_id TEXT; \
     ALTER TABLE plans ADD COLUMN heartbeat_at TEXT;";

impl super::Database {
    /// Initializes the database schema using the embedded SQL file.
    pub(super) fn initialize_schema(&self) -> Result<()> {
        self.connection
            .execute("PRAGMA foreign_keys = ON", [])
            .db_context("Failed to enable foreign keys")?;

        // WAL lets status polls read while a step worker writes.
        let _mode: String = self
            .connection
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .db_context("Failed to enable WAL journal mode")?;

        let schema_sql = include_str!("../../assets/schema.sql");
        self.connection
            .execute_batch(schema_sql)
            .db_context("Failed to initialize database schema")?;

        self.apply_migrations()
    }

    /// Brings databases created by older builds up to the current version.
    ///
    /// A fresh database reports version 0 and already has every column from
    /// `schema.sql`, so only the version number is written for it.
    fn apply_migrations(&self) -> Result<()> {
        let version: i64 = self
            .connection
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .db_context("Failed to read schema version")?;

        if version == 1 {
            self.connection
                .execute_batch(ADD_RUN_LEASE_SQL)
                .db_context("Failed to add run lease columns")?;
        }
        if version < SCHEMA_VERSION {
            log::debug!("Migrating schema from version {version} to {SCHEMA_VERSION}");
            self.connection
                .execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
                .db_context("Failed to record schema version")?;
        }

        Ok(())
    }

    /// Returns the schema version recorded in the database.
    pub fn schema_version(&self) -> Result<i64> {
        self.connection
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .db_context("Failed to read schema version")
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use tempfile::NamedTempFile;

    use super::{super::Database, SCHEMA_VERSION};

    #[test]
    fn test_version_one_database_gains_lease_columns() {
        let file = NamedTempFile::new().unwrap();
        {
            let conn = Connection::open(file.path()).unwrap();
            conn.execute_batch(
                "CREATE TABLE plans (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    goal TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    total_steps INTEGER NOT NULL,
                    progress REAL NOT NULL DEFAULT 0.0,
                    document TEXT NOT NULL,
                    final_result TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                PRAGMA user_version = 1;",
            )
            .unwrap();
        }

        let db = Database::new(file.path()).unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);

        let mut stmt = db.connection.prepare("PRAGMA table_info(plans)").unwrap();
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        assert!(columns.iter().any(|c| c == "runner_id"));
        assert!(columns.iter().any(|c| c == "heartbeat_at"));
    }
}
