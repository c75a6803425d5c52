//! # SDN License Testkit
//!
//! Testing utilities for SDN licensing.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Fixed tokens, inventory bundles and staged artifacts
//!   with outputs computed independently
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Handshake clients and on-disk plugin roots
//!
//! ## Golden Vectors
//!
//! ```rust
//! use sdn_license_core::sign_token;
//! use sdn_license_testkit::vectors::token_vector;
//!
//! let v = token_vector();
//! let token = sign_token(&v.claims(), &v.node_keypair()).unwrap();
//! assert_eq!(token, v.expected_token);
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use sdn_license_testkit::fixtures::{BundleLayout, PluginRoot};
//!
//! let mut root = PluginRoot::new();
//! root.add_encrypted("orbits", "1.0.0", "premium", b"wasm", [7u8; 32], BundleLayout::V2);
//! let registry = root.registry();
//! assert_eq!(registry.count(), 1);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_party_clients, BundleLayout, PluginRoot, TestClient, TestService};
pub use generators::TokenParams;
pub use vectors::{bundle_vectors, token_vector, BundleVector, TokenVector};
