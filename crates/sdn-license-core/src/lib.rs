//! # SDN License Core
//!
//! Pure primitives for SDN licensing: capability tokens, node and client
//! identities, plan scopes, and the key decoding helpers shared by the
//! broker and the handshake.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`CapabilityClaims`] - The signed claim set carried by a capability token
//! - [`TokenVerifier`] - Verifies tokens against a known node key
//! - [`Keypair`] - Ed25519 signing identity, with a libp2p peer id
//! - [`Clock`] - Injected time source (Unix seconds)
//!
//! ## Token Format
//!
//! Tokens are three unpadded base64url segments: header, claims, signature.
//! See [`token`] module.

pub mod clock;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod scopes;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{peer_id_from_public_key, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use encoding::{decode_hex_exact, decode_key32, strip_hex_prefix, KeyDecoder, DEFAULT_KEY_DECODERS};
pub use error::{CoreError, TokenError};
pub use scopes::{is_known_plan, scopes_for_plan};
pub use token::{
    extract_bearer_token, sign_token, verify_token, CapabilityClaims, TokenVerifier,
    VerifyOptions, DEFAULT_VERIFY_LEEWAY_SECS,
};
