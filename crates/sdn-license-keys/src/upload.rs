//! Signed plugin uploads.
//!
//! Publishers sign the SHA-256 digest of the bundle with Ed25519 and send
//! the signature and their public key alongside the bytes.

use bytes::Bytes;
use sha2::{Digest, Sha256};

use sdn_license_core::{decode_hex_exact, CoreError, Ed25519PublicKey, Ed25519Signature, Keypair};

use crate::error::{KeysError, Result};

/// Largest bundle accepted for upload (50 MiB).
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Lowercase hex SHA-256 of `data`.
pub fn bundle_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A plugin bundle submitted by a publisher.
#[derive(Debug, Clone)]
pub struct PluginUpload {
    pub id: String,
    pub version: String,
    /// Empty means the default scope.
    pub required_scope: String,
    pub content_type: Option<String>,
    pub bundle: Bytes,
    pub signature_hex: String,
    pub signer_pubkey_hex: String,
}

impl PluginUpload {
    /// Check size and signature. Returns the bundle hash on success.
    pub fn verify(&self) -> Result<String> {
        if self.bundle.is_empty() {
            return Err(KeysError::InvalidPayload("bundle is empty".into()));
        }
        if self.bundle.len() > MAX_UPLOAD_BYTES {
            return Err(KeysError::TooLarge {
                size: self.bundle.len(),
                limit: MAX_UPLOAD_BYTES,
            });
        }

        let signer = Ed25519PublicKey::from_bytes(decode_hex_exact::<32>(&self.signer_pubkey_hex)?);
        signer.validate()?;
        let signature = Ed25519Signature::from_bytes(decode_hex_exact::<64>(&self.signature_hex)?);

        let digest = Sha256::digest(&self.bundle);
        signer.verify(&digest, &signature).map_err(|e| match e {
            CoreError::InvalidSignature => {
                KeysError::InvalidSignature("bundle signature does not verify".into())
            }
            other => KeysError::CoreError(other),
        })?;

        Ok(hex::encode(digest))
    }
}

/// Publisher side: sign a bundle for upload, returning hex.
pub fn sign_bundle(bundle: &[u8], signer: &Keypair) -> String {
    signer.sign(&Sha256::digest(bundle)).to_hex()
}
