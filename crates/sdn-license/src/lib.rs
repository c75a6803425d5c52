//! # SDN License
//!
//! The license service for an SDN node: wallet handshake, capability token
//! verification, and the plugin key broker, behind one [`LicenseService`].
//!
//! ## Overview
//!
//! - **Handshake**: a client proves control of the Ed25519 key behind its
//!   peer id and receives a capability token scoped by its wallet's plan
//! - **Verify**: resource servers check a bearer token, optionally bound to
//!   the caller's peer id and a set of scopes
//! - **Key envelope**: a token holder receives a plugin's content key
//!   wrapped to its own X25519 key
//! - **Catalog**: manifest, bundle download, signed upload and activation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sdn_license::{LicenseConfig, LicenseService};
//!
//! async fn example() {
//!     let config = LicenseConfig::load_from_path("license.toml".as_ref()).unwrap();
//!     let service = LicenseService::open(config).unwrap();
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:4011").await.unwrap();
//!     service.serve(listener).await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `sdn_license::core` - Tokens, identities, scopes, key decoding
//! - `sdn_license::store` - Entitlement storage
//! - `sdn_license::keys` - Bundle formats, key envelopes, catalog
//! - `sdn_license::auth` - Challenge-response handshake

pub mod config;
pub mod error;
pub mod keyfile;
pub mod service;

// Re-export component crates
pub use sdn_license_auth as auth;
pub use sdn_license_core as core;
pub use sdn_license_keys as keys;
pub use sdn_license_store as store;

pub use config::LicenseConfig;
pub use error::{ApiError, LicenseError, Result};
pub use keyfile::{load_node_x25519_key, load_or_create_signing_key};
pub use service::{
    BundleReply, EntitlementUpdate, EnvelopeReply, KeyEnvelopeRequest, LicenseService, Manifest,
    ENVELOPE_CACHE_CONTROL, ENVELOPE_VARY, PEER_ID_HEADER,
};

// Re-export commonly used types
pub use sdn_license_auth::{Request, Response, PROTOCOL_ID};
pub use sdn_license_core::{CapabilityClaims, Keypair, TokenError};
pub use sdn_license_keys::{open_envelope, PluginKeyEnvelope, X25519StaticSecret};
pub use sdn_license_store::{Entitlement, EntitlementStatus};
