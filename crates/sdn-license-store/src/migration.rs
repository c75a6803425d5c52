//! Versioned SQLite schema for entitlements.
//!
//! `MIGRATIONS[i]` moves the schema from version `i` to `i + 1`. Applied
//! versions are recorded in `schema_migrations`; pending ones run in a single
//! transaction.

use rusqlite::{params, Connection, OptionalExtension};

use sdn_license_core::{Clock, SystemClock};

use crate::error::{Result, StoreError};

const MIGRATIONS: &[&str] = &[
    // v1: one row per wallet. expires_at is Unix seconds, 0 = never.
    r#"
    CREATE TABLE entitlements (
        xpub       TEXT PRIMARY KEY,
        peer_id    TEXT NOT NULL DEFAULT '',
        plan       TEXT NOT NULL DEFAULT 'free',
        status     TEXT NOT NULL DEFAULT 'active',
        expires_at INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX idx_entitlements_plan ON entitlements(plan);
    CREATE INDEX idx_entitlements_status ON entitlements(status);
    "#,
];

/// Schema version after all migrations have run.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Version recorded in `conn`, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Bring `conn` up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    let from = schema_version(conn)?;
    if from > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            from, CURRENT_VERSION
        )));
    }
    if from == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(from as usize) {
        let version = index as u32 + 1;
        tx.execute_batch(sql)
            .map_err(|e| StoreError::Migration(format!("v{}: {}", version, e)))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, SystemClock.now()],
        )?;
    }
    tx.commit()?;

    tracing::debug!(from, to = CURRENT_VERSION, "entitlement schema migrated");
    Ok(())
}
