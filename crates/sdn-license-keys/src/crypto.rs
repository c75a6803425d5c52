//! Cryptographic utilities for the key broker.
//!
//! Provides X25519 key agreement, HKDF-SHA256 derivation, AES-256-GCM and
//! the legacy AES-256-CTR + HMAC-SHA256 construction. Every secret type
//! here is zeroized on drop.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use ctr::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{KeysError, Result};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// AES-GCM nonce length.
pub const GCM_NONCE_LEN: usize = 12;
/// AES-GCM tag length.
pub const GCM_TAG_LEN: usize = 16;

/// An X25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            KeysError::InvalidKey(format!("x25519 public key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Convert to x25519-dalek PublicKey.
    pub fn to_dalek(&self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

/// A long-term X25519 secret, such as the node's inventory key.
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(rand::thread_rng()))
    }

    /// Create from raw scalar bytes (clamped by the primitive).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let bytes = Zeroizing::new(bytes);
        Self(StaticSecret::from(*bytes))
    }

    /// Derive the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// Perform key agreement with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &X25519PublicKey) -> Result<SharedKey> {
        SharedKey::checked(self.0.diffie_hellman(&peer_public.to_dalek()))
    }
}

/// Ephemeral key pair for one-time key agreement.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral key pair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = X25519PublicKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// Perform key agreement with a peer's public key.
    ///
    /// Consumes the ephemeral secret, which is wiped when it drops here.
    pub fn diffie_hellman(self, peer_public: &X25519PublicKey) -> Result<SharedKey> {
        SharedKey::checked(self.secret.diffie_hellman(&peer_public.to_dalek()))
    }
}

/// A shared secret derived from X25519 key agreement.
pub struct SharedKey(SharedSecret);

impl SharedKey {
    fn checked(shared: SharedSecret) -> Result<Self> {
        if !shared.was_contributory() {
            return Err(KeysError::NonContributory);
        }
        Ok(Self(shared))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Derive a symmetric key with HKDF-SHA256.
    pub fn derive_key(&self, salt: &[u8], info: &[u8]) -> Result<SymmetricKey> {
        hkdf_sha256(self.as_bytes(), salt, info)
    }
}

/// HKDF-SHA256 to a 32-byte key.
///
/// Expansion cannot fail for a 32-byte output; if it ever does the error is
/// returned rather than a weaker key.
pub fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<SymmetricKey> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(info, okm.as_mut())
        .map_err(|e| KeysError::KeyDerivation(e.to_string()))?;
    Ok(SymmetricKey(okm))
}

/// A 256-bit symmetric key for AES-256-GCM, AES-256-CTR or HMAC-SHA256.
pub struct SymmetricKey(Zeroizing<[u8; 32]>);

impl SymmetricKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        rand::thread_rng().fill_bytes(key.as_mut());
        Self(key)
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Copy a 32-byte slice into a key.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(KeysError::InvalidKey(format!(
                "symmetric key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// AES-256-GCM seal. Returns ciphertext with the tag appended.
    pub fn seal(&self, nonce: &[u8; GCM_NONCE_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(self.as_bytes().into());
        cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|e| KeysError::EncryptionError(e.to_string()))
    }

    /// AES-256-GCM open of ciphertext with the tag appended.
    pub fn open(&self, nonce: &[u8], sealed: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if nonce.len() != GCM_NONCE_LEN {
            return Err(KeysError::InvalidPayload(format!(
                "invalid gcm nonce length: expected {}, got {}",
                GCM_NONCE_LEN,
                nonce.len()
            )));
        }
        let cipher = Aes256Gcm::new(self.as_bytes().into());
        cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: sealed, aad })
            .map(Zeroizing::new)
            .map_err(|_| KeysError::Authentication("aes-gcm open failed".into()))
    }

    /// AES-256-GCM open with the tag carried separately.
    pub fn open_detached(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        aad: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        if tag.len() != GCM_TAG_LEN {
            return Err(KeysError::InvalidPayload(format!(
                "invalid gcm tag length: expected {}, got {}",
                GCM_TAG_LEN,
                tag.len()
            )));
        }
        let mut sealed = Vec::with_capacity(ciphertext.len() + tag.len());
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);
        self.open(nonce, &sealed, aad)
    }

    /// HMAC-SHA256 over the concatenation of `parts`.
    pub fn hmac_sha256(&self, parts: &[&[u8]]) -> Result<[u8; 32]> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(self.as_bytes())
            .map_err(|e| KeysError::KeyDerivation(e.to_string()))?;
        for part in parts {
            mac.update(part);
        }
        Ok(mac.finalize().into_bytes().into())
    }

    /// Check an HMAC-SHA256 tag in constant time.
    pub fn verify_hmac_sha256(&self, parts: &[&[u8]], tag: &[u8]) -> Result<()> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(self.as_bytes())
            .map_err(|e| KeysError::KeyDerivation(e.to_string()))?;
        for part in parts {
            mac.update(part);
        }
        mac.verify_slice(tag)
            .map_err(|_| KeysError::Authentication("HMAC verification failed".into()))
    }

    /// AES-256-CTR keystream over `data`, with a 128-bit big-endian counter
    /// starting at `iv`.
    pub fn apply_ctr(&self, iv: &[u8; 16], data: &mut [u8]) {
        let mut cipher = Aes256Ctr::new(self.as_bytes().into(), iv.into());
        cipher.apply_keystream(data);
    }
}

/// A fresh random AES-GCM nonce.
pub fn random_nonce() -> [u8; GCM_NONCE_LEN] {
    let mut nonce = [0u8; GCM_NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}
