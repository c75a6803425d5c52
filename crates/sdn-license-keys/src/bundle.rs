//! Inventory bundle formats.
//!
//! Bundles held in the plugin inventory are encrypted to the node's static
//! X25519 key. Two wire layouts exist:
//!
//! ```text
//! V2: [0x02][32 eph pub][12 iv][16 tag][ciphertext]        AES-256-GCM, eph as AAD
//! V1: [32 eph pub][16 iv][32 hmac][ciphertext]             AES-256-CTR + HMAC-SHA256
//! ```
//!
//! Both derive the content key as
//! `HKDF-SHA256(ECDH(node, eph), salt = 32 zero bytes, info = "plugin-bundle-v1")`.
//! The layout is decided once in [`EncryptedBundle::parse`].

use zeroize::Zeroizing;

use crate::crypto::{
    hkdf_sha256, EphemeralKeyPair, SymmetricKey, X25519PublicKey, X25519StaticSecret,
    GCM_NONCE_LEN, GCM_TAG_LEN,
};
use crate::error::{KeysError, Result};

/// Leading byte of a V2 bundle.
pub const BUNDLE_V2_FORMAT: u8 = 0x02;
/// HKDF info for bundle content keys.
pub const BUNDLE_HKDF_INFO: &[u8] = b"plugin-bundle-v1";
/// HKDF salt for bundle content keys.
pub const BUNDLE_HKDF_SALT: [u8; 32] = [0u8; 32];

const V2_HEADER_LEN: usize = 1 + 32 + GCM_NONCE_LEN + GCM_TAG_LEN;
const V1_HEADER_LEN: usize = 32 + 16 + 32;

/// A parsed inventory bundle, borrowing from the raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptedBundle<'a> {
    /// AES-256-GCM layout.
    V2 {
        ephemeral: [u8; 32],
        iv: &'a [u8],
        tag: &'a [u8],
        ciphertext: &'a [u8],
    },
    /// Legacy AES-256-CTR + HMAC-SHA256 layout.
    V1 {
        ephemeral: [u8; 32],
        iv: [u8; 16],
        mac: &'a [u8],
        ciphertext: &'a [u8],
    },
}

impl<'a> EncryptedBundle<'a> {
    /// Classify and split raw bundle bytes.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(KeysError::InvalidPayload("empty encrypted data".into()));
        }

        if data[0] == BUNDLE_V2_FORMAT {
            if data.len() < V2_HEADER_LEN {
                return Err(KeysError::InvalidPayload("invalid V2 payload: too short".into()));
            }
            let (ephemeral, rest) = split_array::<32>(&data[1..])?;
            let (iv, rest) = rest.split_at(GCM_NONCE_LEN);
            let (tag, ciphertext) = rest.split_at(GCM_TAG_LEN);
            return Ok(EncryptedBundle::V2 {
                ephemeral,
                iv,
                tag,
                ciphertext,
            });
        }

        if data.len() >= V1_HEADER_LEN {
            let (ephemeral, rest) = split_array::<32>(data)?;
            let (iv, rest) = split_array::<16>(rest)?;
            let (mac, ciphertext) = rest.split_at(32);
            return Ok(EncryptedBundle::V1 {
                ephemeral,
                iv,
                mac,
                ciphertext,
            });
        }

        Err(KeysError::UnrecognizedFormat)
    }

    /// Wire format version.
    pub fn version(&self) -> u8 {
        match self {
            EncryptedBundle::V2 { .. } => 2,
            EncryptedBundle::V1 { .. } => 1,
        }
    }

    /// Decrypt with the node's static X25519 secret.
    pub fn decrypt(&self, node_secret: &X25519StaticSecret) -> Result<Zeroizing<Vec<u8>>> {
        match *self {
            EncryptedBundle::V2 {
                ephemeral,
                iv,
                tag,
                ciphertext,
            } => {
                let key = content_key(node_secret, &ephemeral)?;
                key.open_detached(iv, ciphertext, tag, &ephemeral)
            }
            EncryptedBundle::V1 {
                ephemeral,
                iv,
                mac,
                ciphertext,
            } => {
                let key = content_key(node_secret, &ephemeral)?;
                key.verify_hmac_sha256(&[&ephemeral, &iv, ciphertext], mac)?;
                let mut plaintext = Zeroizing::new(ciphertext.to_vec());
                key.apply_ctr(&iv, &mut plaintext);
                Ok(plaintext)
            }
        }
    }
}

fn split_array<const N: usize>(data: &[u8]) -> Result<([u8; N], &[u8])> {
    if data.len() < N {
        return Err(KeysError::InvalidPayload("truncated bundle header".into()));
    }
    let (head, rest) = data.split_at(N);
    let mut arr = [0u8; N];
    arr.copy_from_slice(head);
    Ok((arr, rest))
}

fn content_key(node_secret: &X25519StaticSecret, ephemeral: &[u8; 32]) -> Result<SymmetricKey> {
    let shared = node_secret.diffie_hellman(&X25519PublicKey::from_bytes(*ephemeral))?;
    hkdf_sha256(shared.as_bytes(), &BUNDLE_HKDF_SALT, BUNDLE_HKDF_INFO)
}

/// Decrypt raw inventory bytes with the node key.
///
/// A missing node key is an error; callers serving plain assets should not
/// call this at all.
pub fn decrypt_bundle(
    data: &[u8],
    node_secret: Option<&X25519StaticSecret>,
) -> Result<Zeroizing<Vec<u8>>> {
    let bundle = EncryptedBundle::parse(data)?;
    let node_secret =
        node_secret.ok_or_else(|| KeysError::InvalidKey("node x25519 key not configured".into()))?;
    let plaintext = bundle.decrypt(node_secret)?;
    tracing::debug!(version = bundle.version(), len = plaintext.len(), "bundle decrypted");
    Ok(plaintext)
}

/// Encrypt `plaintext` to `node_public` in the V2 layout.
pub fn encrypt_bundle_v2(plaintext: &[u8], node_public: &X25519PublicKey) -> Result<Vec<u8>> {
    let eph = EphemeralKeyPair::generate();
    let eph_public = eph.public_key();
    let shared = eph.diffie_hellman(node_public)?;
    let key = hkdf_sha256(shared.as_bytes(), &BUNDLE_HKDF_SALT, BUNDLE_HKDF_INFO)?;

    let iv = crate::crypto::random_nonce();
    let sealed = key.seal(&iv, plaintext, eph_public.as_bytes())?;
    let (ct, tag) = sealed.split_at(sealed.len() - GCM_TAG_LEN);

    let mut out = Vec::with_capacity(V2_HEADER_LEN + ct.len());
    out.push(BUNDLE_V2_FORMAT);
    out.extend_from_slice(eph_public.as_bytes());
    out.extend_from_slice(&iv);
    out.extend_from_slice(tag);
    out.extend_from_slice(ct);
    Ok(out)
}

/// Encrypt `plaintext` to `node_public` in the legacy V1 layout.
pub fn encrypt_bundle_v1(plaintext: &[u8], node_public: &X25519PublicKey) -> Result<Vec<u8>> {
    use rand::RngCore;

    // A leading 0x02 would parse as V2.
    let eph = loop {
        let candidate = EphemeralKeyPair::generate();
        if candidate.public_key().as_bytes()[0] != BUNDLE_V2_FORMAT {
            break candidate;
        }
    };
    let eph_public = eph.public_key();
    let shared = eph.diffie_hellman(node_public)?;
    let key = hkdf_sha256(shared.as_bytes(), &BUNDLE_HKDF_SALT, BUNDLE_HKDF_INFO)?;

    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);
    let mut ct = plaintext.to_vec();
    key.apply_ctr(&iv, &mut ct);
    let mac = key.hmac_sha256(&[eph_public.as_bytes(), &iv, &ct])?;

    let mut out = Vec::with_capacity(V1_HEADER_LEN + ct.len());
    out.extend_from_slice(eph_public.as_bytes());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&mac);
    out.extend_from_slice(&ct);
    Ok(out)
}
