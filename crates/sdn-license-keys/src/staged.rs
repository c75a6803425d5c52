//! Staged artifacts from the key server.
//!
//! A staged artifact is a JSON document carrying content encrypted under a
//! random content key, with that key wrapped to the node's X25519 key
//! (ECIES: X25519, HKDF-SHA256, AES-256-GCM).

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use sdn_license_core::decode_hex_exact;

use crate::crypto::{
    hkdf_sha256, random_nonce, EphemeralKeyPair, SymmetricKey, X25519PublicKey,
    X25519StaticSecret, GCM_TAG_LEN,
};
use crate::error::{KeysError, Result};

/// The only key-wrapping scheme staged artifacts use.
pub const STAGED_KEY_SCHEME: &str = "ecies-x25519-hkdf-sha256-aes-256-gcm";
/// The only content algorithm; an empty string means the same.
pub const STAGED_CONTENT_ALG: &str = "aes-256-gcm";

/// HKDF info strings for the wrap key, newest first.
///
/// Artifacts staged before the rename used the older label. The first entry
/// that authenticates wins; drop the legacy entry once no staged artifacts
/// carry it.
pub const STAGED_WRAP_INFOS: &[&str] = &[
    "orbpro-key-server-artifact-wrap-v1",
    "plugin-key-server-artifact-wrap-v1",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedKeyEncryption {
    pub scheme: String,
    pub ephemeral_public_key_hex: String,
    pub hkdf_salt_b64: String,
    pub wrap_iv_b64: String,
    pub wrapped_key_b64: String,
    pub wrapped_key_tag_b64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedContentEncryption {
    #[serde(default)]
    pub algorithm: String,
    pub iv_b64: String,
    pub tag_b64: String,
    pub ciphertext_b64: String,
}

/// A staged artifact envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedArtifact {
    pub key_encryption: StagedKeyEncryption,
    pub content_encryption: StagedContentEncryption,
}

/// Decode base64 in either alphabet, with or without padding.
pub fn decode_base64_loose(input: &str) -> Result<Vec<u8>> {
    let normalized: String = input
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    STANDARD_NO_PAD
        .decode(normalized)
        .map_err(|e| KeysError::InvalidPayload(format!("invalid base64: {}", e)))
}

impl StagedArtifact {
    /// Parse from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| KeysError::SerializationError(e.to_string()))
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| KeysError::SerializationError(e.to_string()))
    }

    /// Recover the wrapped content key with the node secret.
    pub fn unwrap_key(&self, node_secret: &X25519StaticSecret) -> Result<SymmetricKey> {
        let ke = &self.key_encryption;
        if ke.scheme != STAGED_KEY_SCHEME {
            return Err(KeysError::UnsupportedScheme(ke.scheme.clone()));
        }

        let eph = X25519PublicKey::from_bytes(decode_hex_exact::<32>(&ke.ephemeral_public_key_hex)?);
        let salt = decode_base64_loose(&ke.hkdf_salt_b64)?;
        let iv = decode_base64_loose(&ke.wrap_iv_b64)?;
        let wrapped = decode_base64_loose(&ke.wrapped_key_b64)?;
        let tag = decode_base64_loose(&ke.wrapped_key_tag_b64)?;

        let shared = node_secret.diffie_hellman(&eph)?;
        for info in STAGED_WRAP_INFOS {
            let wrap_key = hkdf_sha256(shared.as_bytes(), &salt, info.as_bytes())?;
            match wrap_key.open_detached(&iv, &wrapped, &tag, &[]) {
                Ok(raw) => {
                    let key = SymmetricKey::from_slice(&raw)?;
                    tracing::debug!(info = *info, "staged key unwrapped");
                    return Ok(key);
                }
                Err(KeysError::Authentication(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(KeysError::Authentication("staged key unwrap failed".into()))
    }

    /// Recover the plaintext content.
    pub fn decrypt(&self, node_secret: &X25519StaticSecret) -> Result<Zeroizing<Vec<u8>>> {
        let ce = &self.content_encryption;
        if !ce.algorithm.is_empty() && !ce.algorithm.eq_ignore_ascii_case(STAGED_CONTENT_ALG) {
            return Err(KeysError::UnsupportedScheme(ce.algorithm.clone()));
        }

        let key = self.unwrap_key(node_secret)?;
        let iv = decode_base64_loose(&ce.iv_b64)?;
        let tag = decode_base64_loose(&ce.tag_b64)?;
        let ciphertext = decode_base64_loose(&ce.ciphertext_b64)?;
        key.open_detached(&iv, &ciphertext, &tag, &[])
    }

    /// Stage `plaintext` for `node_public` using `info` for the wrap key.
    pub fn seal(plaintext: &[u8], node_public: &X25519PublicKey, info: &str) -> Result<Self> {
        use rand::RngCore;

        let content_key = SymmetricKey::generate();
        let content_iv = random_nonce();
        let sealed_content = content_key.seal(&content_iv, plaintext, &[])?;
        let (ct, ct_tag) = sealed_content.split_at(sealed_content.len() - GCM_TAG_LEN);

        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);
        let eph = EphemeralKeyPair::generate();
        let eph_public = eph.public_key();
        let shared = eph.diffie_hellman(node_public)?;
        let wrap_key = hkdf_sha256(shared.as_bytes(), &salt, info.as_bytes())?;
        let wrap_iv = random_nonce();
        let wrapped = wrap_key.seal(&wrap_iv, content_key.as_bytes(), &[])?;
        let (wk, wk_tag) = wrapped.split_at(wrapped.len() - GCM_TAG_LEN);

        Ok(Self {
            key_encryption: StagedKeyEncryption {
                scheme: STAGED_KEY_SCHEME.to_string(),
                ephemeral_public_key_hex: hex::encode(eph_public.as_bytes()),
                hkdf_salt_b64: STANDARD_NO_PAD.encode(salt),
                wrap_iv_b64: STANDARD_NO_PAD.encode(wrap_iv),
                wrapped_key_b64: STANDARD_NO_PAD.encode(wk),
                wrapped_key_tag_b64: STANDARD_NO_PAD.encode(wk_tag),
            },
            content_encryption: StagedContentEncryption {
                algorithm: STAGED_CONTENT_ALG.to_string(),
                iv_b64: STANDARD_NO_PAD.encode(content_iv),
                tag_b64: STANDARD_NO_PAD.encode(ct_tag),
                ciphertext_b64: STANDARD_NO_PAD.encode(ct),
            },
        })
    }
}

/// Parse and decrypt a staged artifact in one step.
pub fn unwrap_staged_artifact(
    json: &[u8],
    node_secret: &X25519StaticSecret,
) -> Result<Zeroizing<Vec<u8>>> {
    StagedArtifact::from_json(json)?.decrypt(node_secret)
}
