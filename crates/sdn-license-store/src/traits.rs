//! Entitlement store traits.
//!
//! The handshake only needs [`EntitlementResolver`]. Administration and
//! billing integrations use the wider [`EntitlementStore`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::entitlement::Entitlement;
use crate::error::Result;

/// Maps a wallet to its entitlement, creating a default one if needed.
#[async_trait]
pub trait EntitlementResolver: Send + Sync {
    /// Return the entitlement for `xpub`, creating an active free-plan
    /// record bound to `peer_id` if none exists.
    async fn get_or_create(&self, xpub: &str, peer_id: &str) -> Result<Entitlement>;
}

/// Read/write access to entitlements.
#[async_trait]
pub trait EntitlementStore: EntitlementResolver {
    /// Get the entitlement for `xpub`, if any.
    async fn get(&self, xpub: &str) -> Result<Option<Entitlement>>;

    /// Insert or replace an entitlement.
    ///
    /// Fields are trimmed, an empty plan becomes `free`, and `updated_at` is
    /// stamped with the store's clock. Returns the record as written.
    async fn upsert(&self, entitlement: &Entitlement) -> Result<Entitlement>;

    /// Number of stored entitlements.
    async fn count(&self) -> Result<usize>;
}

#[async_trait]
impl<T: EntitlementResolver + ?Sized> EntitlementResolver for Arc<T> {
    async fn get_or_create(&self, xpub: &str, peer_id: &str) -> Result<Entitlement> {
        (**self).get_or_create(xpub, peer_id).await
    }
}

#[async_trait]
impl<T: EntitlementStore + ?Sized> EntitlementStore for Arc<T> {
    async fn get(&self, xpub: &str) -> Result<Option<Entitlement>> {
        (**self).get(xpub).await
    }

    async fn upsert(&self, entitlement: &Entitlement) -> Result<Entitlement> {
        (**self).upsert(entitlement).await
    }

    async fn count(&self) -> Result<usize> {
        (**self).count().await
    }
}
