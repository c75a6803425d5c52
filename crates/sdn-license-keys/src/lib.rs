//! # SDN License Keys
//!
//! The plugin key broker.
//!
//! ## Overview
//!
//! Plugins are distributed as bundles. The node keeps them in an inventory
//! (the plugin root) and hands out their content keys only to requesters
//! holding a capability token with the plugin's required scope.
//!
//! ## Key Concepts
//!
//! - **Inventory bundle**: bytes encrypted to the node's static X25519 key,
//!   in one of two layouts ([`EncryptedBundle`])
//! - **Key envelope**: a content key wrapped to one requester's X25519 key,
//!   bound to its token and short-lived ([`PluginKeyEnvelope`])
//! - **Staged artifact**: JSON-wrapped content from the key server
//!   ([`StagedArtifact`])
//! - **Registry**: the validated `catalog.json` ([`PluginRegistry`])
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sdn_license_keys::{open_envelope, X25519StaticSecret};
//!
//! // Requester side
//! let requester = X25519StaticSecret::generate();
//! // send requester.public_key() with the capability token, receive `envelope`
//! // let key = open_envelope(&envelope, &requester, now)?;
//! ```

pub mod bundle;
pub mod catalog;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod staged;
pub mod upload;

pub use bundle::{decrypt_bundle, encrypt_bundle_v1, encrypt_bundle_v2, EncryptedBundle};
pub use catalog::{
    is_valid_plugin_id, resolve_relative_path, BundleBytes, CatalogEntry, CatalogFile,
    PluginAsset, PluginDescriptor, PluginRegistry, RuntimeState, RuntimeStatus, StorageMode,
};
pub use crypto::{
    hkdf_sha256, EphemeralKeyPair, SharedKey, SymmetricKey, X25519PublicKey, X25519StaticSecret,
};
pub use envelope::{
    build_envelope, envelope_aad, open_envelope, EnvelopeTarget, PluginKeyEnvelope, ENVELOPE_ALG,
    ENVELOPE_TTL_SECS,
};
pub use error::{KeysError, Result};
pub use staged::{decode_base64_loose, unwrap_staged_artifact, StagedArtifact, STAGED_WRAP_INFOS};
pub use upload::{bundle_sha256, sign_bundle, PluginUpload, MAX_UPLOAD_BYTES};
