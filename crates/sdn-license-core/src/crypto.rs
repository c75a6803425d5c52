//! Ed25519 identities for nodes and clients.
//!
//! Wraps Ed25519 signing with strong types and derives libp2p peer ids
//! from public keys.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use crate::encoding::decode_hex_exact;
use crate::error::CoreError;

/// A 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, as carried in `client_pubkey_hex`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse 64 hex characters, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        decode_hex_exact::<32>(s).map(Self)
    }

    /// Check that the bytes decode to a curve point.
    pub fn validate(&self) -> Result<(), CoreError> {
        VerifyingKey::from_bytes(&self.0)
            .map(|_| ())
            .map_err(|_| CoreError::InvalidPublicKey)
    }

    /// Strict verification: rejects non-canonical and small-order forms.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        VerifyingKey::from_bytes(&self.0)
            .map_err(|_| CoreError::InvalidPublicKey)?
            .verify_strict(message, &Signature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }

    /// The libp2p peer id (`12D3KooW...`) for this key.
    pub fn peer_id(&self) -> Result<String, CoreError> {
        peer_id_from_public_key(&self.0)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ed25519PublicKey")
            .field(&format_args!("{}..", &self.to_hex()[..12]))
            .finish()
    }
}

impl AsRef<[u8]> for Ed25519PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Ed25519PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Derive the base58 libp2p peer id for a raw Ed25519 public key.
pub fn peer_id_from_public_key(raw: &[u8; 32]) -> Result<String, CoreError> {
    let key = libp2p_identity::ed25519::PublicKey::try_from_bytes(raw)
        .map_err(|_| CoreError::InvalidPublicKey)?;
    let public = libp2p_identity::PublicKey::from(key);
    Ok(libp2p_identity::PeerId::from_public_key(&public).to_base58())
}

/// A 64-byte Ed25519 signature. Serialized as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Serialize for Ed25519Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode_hex_exact::<64>(&s)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

impl Ed25519Signature {
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// From a slice, which must be exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 64] = bytes.try_into().map_err(|_| CoreError::InvalidKeyLength {
            expected: 64,
            got: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Lowercase hex, as carried in `signature_hex`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ed25519Signature")
            .field(&format_args!("{}..", &self.to_hex()[..12]))
            .finish()
    }
}

impl AsRef<[u8]> for Ed25519Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An Ed25519 signing identity.
///
/// Used by the node to sign capability tokens and by clients to answer
/// handshake challenges. The secret half is zeroized on drop.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Deterministic identity from a 32-byte seed file.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Create from 64 bytes of `seed || public key`.
    ///
    /// Fails if the public half does not belong to the seed.
    pub fn from_keypair_bytes(bytes: &[u8; 64]) -> Result<Self, CoreError> {
        let signing_key =
            SigningKey::from_keypair_bytes(bytes).map_err(|_| CoreError::InvalidPublicKey)?;
        Ok(Self { signing_key })
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature::from_bytes(self.signing_key.sign(message).to_bytes())
    }

    /// Secret seed, as persisted in the signing key file.
    pub fn seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// The libp2p peer id of this identity.
    pub fn peer_id(&self) -> String {
        // A key we hold is always a valid point.
        self.public_key().peer_id().unwrap_or_default()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("peer_id", &self.peer_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_signature() {
        let client = Keypair::generate();
        let challenge = [0x5Au8; 32];
        let signature = client.sign(&challenge);

        assert!(client.public_key().verify(&challenge, &signature).is_ok());
        assert!(matches!(
            client.public_key().verify(&[0x5Bu8; 32], &signature),
            Err(CoreError::InvalidSignature)
        ));
        assert!(Keypair::generate()
            .public_key()
            .verify(&challenge, &signature)
            .is_err());
    }

    #[test]
    fn test_seed_reproduces_identity() {
        let seed = [0x42u8; 32];
        let node = Keypair::from_seed(&seed);
        assert_eq!(node.public_key(), Keypair::from_seed(&seed).public_key());
        assert_eq!(*node.seed(), seed);
    }

    #[test]
    fn test_keypair_bytes_must_match() {
        let kp = Keypair::from_seed(&[7u8; 32]);
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&*kp.seed());
        bytes[32..].copy_from_slice(kp.public_key().as_bytes());

        let restored = Keypair::from_keypair_bytes(&bytes).unwrap();
        assert_eq!(restored.public_key(), kp.public_key());

        bytes[40] ^= 0xFF;
        assert!(Keypair::from_keypair_bytes(&bytes).is_err());
    }

    #[test]
    fn test_peer_id_is_libp2p_ed25519() {
        let kp = Keypair::from_seed(&[1u8; 32]);
        let peer = kp.peer_id();
        assert!(peer.starts_with("12D3KooW"), "unexpected peer id {peer}");
        assert_eq!(peer, Keypair::from_seed(&[1u8; 32]).peer_id());
        assert_ne!(peer, Keypair::from_seed(&[2u8; 32]).peer_id());
    }

    #[test]
    fn test_signature_from_slice_length() {
        assert!(Ed25519Signature::from_slice(&[0u8; 63]).is_err());
        assert!(Ed25519Signature::from_slice(&[0u8; 64]).is_ok());
    }

    #[test]
    fn test_signature_serializes_as_hex() {
        let sig = Keypair::from_seed(&[4u8; 32]).sign(b"challenge");
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, format!("\"{}\"", sig.to_hex()));

        let back: Ed25519Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
        assert!(serde_json::from_str::<Ed25519Signature>("\"abcd\"").is_err());
    }

    #[test]
    fn test_public_key_hex_forms() {
        let pk = Keypair::from_seed(&[3u8; 32]).public_key();
        assert_eq!(Ed25519PublicKey::from_hex(&pk.to_hex()).unwrap(), pk);
        assert_eq!(Ed25519PublicKey::from_hex(&format!("0x{}", pk.to_hex())).unwrap(), pk);
        assert!(Ed25519PublicKey::from_hex(&pk.to_hex()[..62]).is_err());
    }
}
