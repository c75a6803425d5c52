//! In-memory implementation of the entitlement store.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use sdn_license_core::{Clock, SystemClock};

use crate::entitlement::Entitlement;
use crate::error::{Result, StoreError};
use crate::traits::{EntitlementResolver, EntitlementStore};

/// In-memory entitlement store.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryEntitlementStore {
    entitlements: RwLock<HashMap<String, Entitlement>>,
    clock: Arc<dyn Clock>,
}

impl MemoryEntitlementStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new empty store stamping records with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entitlements: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn poisoned() -> StoreError {
        StoreError::InvalidData("entitlement map lock poisoned".into())
    }
}

impl Default for MemoryEntitlementStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntitlementResolver for MemoryEntitlementStore {
    async fn get_or_create(&self, xpub: &str, peer_id: &str) -> Result<Entitlement> {
        let xpub = xpub.trim();
        if xpub.is_empty() {
            return Err(StoreError::MissingField("xpub"));
        }

        let mut map = self.entitlements.write().map_err(|_| Self::poisoned())?;
        let now = self.clock.now();
        let ent = map
            .entry(xpub.to_string())
            .or_insert_with(|| Entitlement::new_default(xpub, peer_id, now));
        Ok(ent.clone())
    }
}

#[async_trait]
impl EntitlementStore for MemoryEntitlementStore {
    async fn get(&self, xpub: &str) -> Result<Option<Entitlement>> {
        let xpub = xpub.trim();
        if xpub.is_empty() {
            return Err(StoreError::MissingField("xpub"));
        }
        let map = self.entitlements.read().map_err(|_| Self::poisoned())?;
        Ok(map.get(xpub).cloned())
    }

    async fn upsert(&self, entitlement: &Entitlement) -> Result<Entitlement> {
        let record = entitlement.normalized(self.clock.now())?;
        let mut map = self.entitlements.write().map_err(|_| Self::poisoned())?;
        map.insert(record.xpub.clone(), record.clone());
        Ok(record)
    }

    async fn count(&self) -> Result<usize> {
        let map = self.entitlements.read().map_err(|_| Self::poisoned())?;
        Ok(map.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::EntitlementStatus;
    use sdn_license_core::ManualClock;

    #[tokio::test]
    async fn test_get_or_create_defaults() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryEntitlementStore::with_clock(clock);

        let ent = store.get_or_create(" xpub-a ", "peer-a").await.unwrap();
        assert_eq!(ent.xpub, "xpub-a");
        assert_eq!(ent.plan, "free");
        assert_eq!(ent.status, EntitlementStatus::Active);
        assert_eq!(ent.updated_at, 1_000);
        assert_eq!(store.count().await.unwrap(), 1);

        // Existing records are returned untouched.
        let again = store.get_or_create("xpub-a", "peer-b").await.unwrap();
        assert_eq!(again.peer_id, "peer-a");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_then_get() {
        let store = MemoryEntitlementStore::new();
        assert!(store.get("xpub-b").await.unwrap().is_none());

        let mut ent = Entitlement::new_default("xpub-b", "peer", 0);
        ent.plan = "pro".into();
        ent.status = EntitlementStatus::PastDue;
        store.upsert(&ent).await.unwrap();

        let stored = store.get("xpub-b").await.unwrap().unwrap();
        assert_eq!(stored.plan, "pro");
        assert_eq!(stored.status, EntitlementStatus::PastDue);
        assert!(stored.updated_at > 0);
    }

    #[tokio::test]
    async fn test_empty_xpub_rejected() {
        let store = MemoryEntitlementStore::new();
        assert!(store.get_or_create("  ", "peer").await.is_err());
        assert!(store.get("").await.is_err());
    }
}
