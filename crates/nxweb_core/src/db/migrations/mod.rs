//! Ordered dashboard schema scripts.
//!
//! Each step is one embedded SQL file. The highest applied step is stored in
//! `PRAGMA user_version`; pending steps run inside a single transaction.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "dashboard",
        sql: include_str!("0001_dashboard.sql"),
    },
    Step {
        version: 2,
        name: "debug_tools",
        sql: include_str!("0002_debug_tools.sql"),
    },
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    STEPS.iter().map(|step| step.version).max().unwrap_or(0)
}

/// Version recorded in the database file.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}

/// Brings the schema up to [`latest_version`]; returns how many steps ran.
///
/// A database written by a newer build is rejected untouched.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let from = schema_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Step> = STEPS.iter().filter(|step| step.version > from).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for step in &pending {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
    }
    tx.commit()?;

    let names: Vec<&str> = pending.iter().map(|step| step.name).collect();
    info!(
        "event=db_migrate module=db status=ok from_version={from} to_version={latest} steps={}",
        names.join(",")
    );
    Ok(pending.len())
}
