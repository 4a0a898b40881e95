//! Ordered schema setup for factory-backed test databases.
//!
//! # Responsibility
//! - Apply caller-registered schema steps atomically.
//!
//! # Invariants
//! - `version` values must be strictly increasing.
//! - The last applied step is mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// One versioned DDL batch.
#[derive(Debug, Clone, Copy)]
pub struct SchemaStep {
    pub version: u32,
    pub sql: &'static str,
}

impl SchemaStep {
    pub const fn new(version: u32, sql: &'static str) -> Self {
        Self { version, sql }
    }
}

/// Applies every step newer than the database's `user_version`.
///
/// Returns the schema version after the call.
pub fn apply_schema(conn: &mut Connection, steps: &[SchemaStep]) -> DbResult<u32> {
    check_order(steps)?;

    let current_version = current_user_version(conn)?;
    let latest = steps.last().map_or(0, |step| step.version);

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(current_version);
    }

    let tx = conn.transaction()?;
    for step in steps.iter().filter(|step| step.version > current_version) {
        tx.execute_batch(step.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", step.version))?;
    }
    tx.commit()?;

    info!(
        "event=schema_apply module=db status=ok from_version={} to_version={}",
        current_version, latest
    );
    Ok(latest)
}

fn check_order(steps: &[SchemaStep]) -> DbResult<()> {
    for pair in steps.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(DbError::InvalidSchemaOrder {
                previous: pair[0].version,
                next: pair[1].version,
            });
        }
    }
    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::{apply_schema, SchemaStep};
    use crate::db::{open_db_in_memory, DbError};

    const STEPS: &[SchemaStep] = &[
        SchemaStep::new(1, "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT UNIQUE);"),
        SchemaStep::new(2, "ALTER TABLE users ADD COLUMN name TEXT;"),
    ];

    #[test]
    fn applies_pending_steps_once() {
        let mut conn = open_db_in_memory().unwrap();
        assert_eq!(apply_schema(&mut conn, &STEPS[..1]).unwrap(), 1);
        assert_eq!(apply_schema(&mut conn, STEPS).unwrap(), 2);
        assert_eq!(apply_schema(&mut conn, STEPS).unwrap(), 2);

        conn.execute("INSERT INTO users (email, name) VALUES ('a@x', 'A');", [])
            .unwrap();
    }

    #[test]
    fn rejects_database_newer_than_steps() {
        let mut conn = open_db_in_memory().unwrap();
        apply_schema(&mut conn, STEPS).unwrap();
        let err = apply_schema(&mut conn, &STEPS[..1]).expect_err("newer db must fail");
        assert!(matches!(
            err,
            DbError::UnsupportedSchemaVersion {
                db_version: 2,
                latest_supported: 1
            }
        ));
    }

    #[test]
    fn rejects_non_monotonic_steps() {
        let mut conn = open_db_in_memory().unwrap();
        let steps = [STEPS[1], STEPS[0]];
        let err = apply_schema(&mut conn, &steps).expect_err("unordered steps must fail");
        assert!(matches!(
            err,
            DbError::InvalidSchemaOrder {
                previous: 2,
                next: 1
            }
        ));
    }
}
