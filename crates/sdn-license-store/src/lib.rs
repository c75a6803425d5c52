//! # SDN License Store
//!
//! Entitlement storage for SDN licensing. Provides a trait-based interface
//! so the handshake can resolve a wallet's plan without knowing where it
//! lives.
//!
//! ## Key Types
//!
//! - [`EntitlementResolver`] - What the handshake needs: get-or-create by xpub
//! - [`EntitlementStore`] - Full read/write interface used by administration
//! - [`SqliteEntitlementStore`] - SQLite-based persistent storage
//! - [`MemoryEntitlementStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sdn_license_store::{EntitlementResolver, SqliteEntitlementStore};
//!
//! async fn example() {
//!     let store = SqliteEntitlementStore::open("entitlements.db").unwrap();
//!     let ent = store.get_or_create("xpub-test", "12D3KooW...").await.unwrap();
//!     assert_eq!(ent.plan, "free");
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Lazy creation**: unknown wallets get an active free entitlement
//! - **Upsert**: writes replace the whole record and stamp `updated_at`

pub mod entitlement;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use entitlement::{Entitlement, EntitlementStatus, DEFAULT_PLAN};
pub use error::{Result, StoreError};
pub use memory::MemoryEntitlementStore;
pub use sqlite::SqliteEntitlementStore;
pub use traits::{EntitlementResolver, EntitlementStore};
