//! SQLite implementation of the entitlement store.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use sdn_license_core::{Clock, SystemClock};

use crate::entitlement::Entitlement;
use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{EntitlementResolver, EntitlementStore};

/// SQLite-based entitlement store.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteEntitlementStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteEntitlementStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates parent directories and the file, then runs migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamp `updated_at` with `clock` instead of wall time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

fn select_entitlement(conn: &Connection, xpub: &str) -> Result<Option<Entitlement>> {
    let row = conn
        .query_row(
            "SELECT xpub, peer_id, plan, status, expires_at, updated_at
             FROM entitlements WHERE xpub = ?1",
            params![xpub],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?;

    row.map(|(xpub, peer_id, plan, status, expires_at, updated_at)| -> Result<Entitlement> {
        Ok(Entitlement {
            xpub,
            peer_id,
            plan,
            status: status.parse()?,
            expires_at,
            updated_at,
        })
    })
    .transpose()
}

fn write_entitlement(conn: &Connection, ent: &Entitlement) -> Result<()> {
    conn.execute(
        "INSERT INTO entitlements (xpub, peer_id, plan, status, expires_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(xpub) DO UPDATE SET
             peer_id = excluded.peer_id,
             plan = excluded.plan,
             status = excluded.status,
             expires_at = excluded.expires_at,
             updated_at = excluded.updated_at",
        params![
            ent.xpub,
            ent.peer_id,
            ent.plan,
            ent.status.as_str(),
            ent.expires_at,
            ent.updated_at
        ],
    )?;
    Ok(())
}

#[async_trait]
impl EntitlementResolver for SqliteEntitlementStore {
    async fn get_or_create(&self, xpub: &str, peer_id: &str) -> Result<Entitlement> {
        let xpub = xpub.trim().to_string();
        if xpub.is_empty() {
            return Err(StoreError::MissingField("xpub"));
        }
        let peer_id = peer_id.to_string();
        let now = self.clock.now();

        self.run(move |conn| {
            if let Some(existing) = select_entitlement(conn, &xpub)? {
                return Ok(existing);
            }
            let ent = Entitlement::new_default(&xpub, &peer_id, now);
            write_entitlement(conn, &ent)?;
            tracing::debug!(xpub = %ent.xpub, "created default entitlement");
            Ok(ent)
        })
        .await
    }
}

#[async_trait]
impl EntitlementStore for SqliteEntitlementStore {
    async fn get(&self, xpub: &str) -> Result<Option<Entitlement>> {
        let xpub = xpub.trim().to_string();
        if xpub.is_empty() {
            return Err(StoreError::MissingField("xpub"));
        }
        self.run(move |conn| select_entitlement(conn, &xpub)).await
    }

    async fn upsert(&self, entitlement: &Entitlement) -> Result<Entitlement> {
        let record = entitlement.normalized(self.clock.now())?;
        self.run(move |conn| {
            write_entitlement(conn, &record)?;
            Ok(record)
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.run(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM entitlements", [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }
}
