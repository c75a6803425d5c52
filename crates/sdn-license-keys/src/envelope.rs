//! Per-requester plugin key envelopes.
//!
//! A requester holding a valid capability token sends its X25519 public key.
//! The broker wraps the plugin's 32-byte content key to that key:
//!
//! 1. `exp = min(now + 120, claims.exp)`
//! 2. fresh ephemeral X25519 key, `shared = ECDH(eph, requester)`
//! 3. `wrap_key = HKDF-SHA256(shared, "plugin-key-v1", "plugin-key-wrap:" || aad)`
//! 4. AES-256-GCM seal of a JSON payload under `aad`
//!
//! The associated data binds issuer, subject, peer, token id, plugin,
//! version, bundle hash, scope and expiry, so any edit to the header is an
//! authentication failure on open.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use sdn_license_core::CapabilityClaims;

use crate::crypto::{
    random_nonce, EphemeralKeyPair, SymmetricKey, X25519PublicKey, X25519StaticSecret,
};
use crate::error::{KeysError, Result};

/// Algorithm label carried in every envelope.
pub const ENVELOPE_ALG: &str = "X25519+SHA256+AES-256-GCM";
/// Upper bound on envelope lifetime.
pub const ENVELOPE_TTL_SECS: i64 = 120;

const WRAP_SALT: &[u8] = b"plugin-key-v1";
const WRAP_INFO_PREFIX: &str = "plugin-key-wrap:";

/// The plugin fields bound into an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeTarget<'a> {
    pub plugin_id: &'a str,
    pub version: &'a str,
    pub required_scope: &'a str,
    /// Lowercase hex SHA-256 of the served bundle.
    pub bundle_sha256: &'a str,
}

/// A wrapped content key, returned to exactly one requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginKeyEnvelope {
    pub plugin_id: String,
    pub version: String,
    pub required_scope: String,
    pub bundle_sha256: String,
    pub alg: String,
    /// Ephemeral server public key.
    pub server_x25519_pubkey: String,
    pub nonce: String,
    pub ciphertext: String,
    pub associated_data: String,
    pub issuer: String,
    pub sub: String,
    pub peer_id: String,
    pub capability_token_jti: String,
    pub expires_at: i64,
}

/// Sealed body of an envelope.
#[derive(Serialize, Deserialize)]
struct WrappedKeyPayload {
    key: String,
    plugin_id: String,
    version: String,
    required_scope: String,
    bundle_sha256: String,
    sub: String,
    peer_id: String,
    jti: String,
    exp: i64,
}

impl Drop for WrappedKeyPayload {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Associated data string for an envelope.
pub fn envelope_aad(
    issuer: &str,
    claims: &CapabilityClaims,
    target: &EnvelopeTarget<'_>,
    exp: i64,
) -> String {
    format!(
        "iss={}|sub={}|peer={}|jti={}|plugin={}|version={}|sha256={}|scope={}|exp={}",
        issuer,
        claims.sub,
        claims.peer_id,
        claims.jti,
        target.plugin_id,
        target.version,
        target.bundle_sha256,
        target.required_scope,
        exp
    )
}

fn wrap_key(shared: &[u8; 32], aad: &str) -> Result<SymmetricKey> {
    let info = format!("{}{}", WRAP_INFO_PREFIX, aad);
    crate::crypto::hkdf_sha256(shared, WRAP_SALT, info.as_bytes())
}

/// Wrap `content_key` for the holder of `requester_public`.
pub fn build_envelope(
    target: &EnvelopeTarget<'_>,
    content_key: &[u8; 32],
    requester_public: &X25519PublicKey,
    claims: &CapabilityClaims,
    issuer: &str,
    now: i64,
) -> Result<PluginKeyEnvelope> {
    let mut exp = now + ENVELOPE_TTL_SECS;
    if claims.exp > 0 && claims.exp < exp {
        exp = claims.exp;
    }
    if exp <= now {
        return Err(KeysError::TokenExpired);
    }

    let eph = EphemeralKeyPair::generate();
    let server_public = eph.public_key();
    let shared = eph.diffie_hellman(requester_public)?;

    let aad = envelope_aad(issuer, claims, target, exp);
    let key = wrap_key(shared.as_bytes(), &aad)?;
    drop(shared);

    let payload = WrappedKeyPayload {
        key: STANDARD_NO_PAD.encode(content_key),
        plugin_id: target.plugin_id.to_string(),
        version: target.version.to_string(),
        required_scope: target.required_scope.to_string(),
        bundle_sha256: target.bundle_sha256.to_string(),
        sub: claims.sub.clone(),
        peer_id: claims.peer_id.clone(),
        jti: claims.jti.clone(),
        exp,
    };
    let plaintext = Zeroizing::new(
        serde_json::to_vec(&payload).map_err(|e| KeysError::SerializationError(e.to_string()))?,
    );

    let nonce = random_nonce();
    let ciphertext = key.seal(&nonce, &plaintext, aad.as_bytes())?;

    Ok(PluginKeyEnvelope {
        plugin_id: target.plugin_id.to_string(),
        version: target.version.to_string(),
        required_scope: target.required_scope.to_string(),
        bundle_sha256: target.bundle_sha256.to_string(),
        alg: ENVELOPE_ALG.to_string(),
        server_x25519_pubkey: STANDARD_NO_PAD.encode(server_public.as_bytes()),
        nonce: STANDARD_NO_PAD.encode(nonce),
        ciphertext: STANDARD_NO_PAD.encode(ciphertext),
        associated_data: aad,
        issuer: issuer.to_string(),
        sub: claims.sub.clone(),
        peer_id: claims.peer_id.clone(),
        capability_token_jti: claims.jti.clone(),
        expires_at: exp,
    })
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD_NO_PAD
        .decode(value)
        .map_err(|e| KeysError::InvalidPayload(format!("{}: {}", name, e)))
}

/// Requester side: recover the content key from an envelope.
pub fn open_envelope(
    envelope: &PluginKeyEnvelope,
    requester_secret: &X25519StaticSecret,
    now: i64,
) -> Result<Zeroizing<[u8; 32]>> {
    if envelope.alg != ENVELOPE_ALG {
        return Err(KeysError::UnsupportedScheme(envelope.alg.clone()));
    }

    let server_public = X25519PublicKey::from_slice(&decode_field(
        "server_x25519_pubkey",
        &envelope.server_x25519_pubkey,
    )?)?;
    let nonce = decode_field("nonce", &envelope.nonce)?;
    let ciphertext = decode_field("ciphertext", &envelope.ciphertext)?;
    let aad = envelope.associated_data.as_str();

    let shared = requester_secret.diffie_hellman(&server_public)?;
    let key = wrap_key(shared.as_bytes(), aad)?;
    drop(shared);

    let plaintext = key.open(&nonce, &ciphertext, aad.as_bytes())?;
    let payload: WrappedKeyPayload = serde_json::from_slice(&plaintext)
        .map_err(|e| KeysError::SerializationError(e.to_string()))?;

    let header = [
        ("plugin_id", &payload.plugin_id, &envelope.plugin_id),
        ("version", &payload.version, &envelope.version),
        ("required_scope", &payload.required_scope, &envelope.required_scope),
        ("bundle_sha256", &payload.bundle_sha256, &envelope.bundle_sha256),
        ("sub", &payload.sub, &envelope.sub),
        ("peer_id", &payload.peer_id, &envelope.peer_id),
        ("jti", &payload.jti, &envelope.capability_token_jti),
    ];
    for (field, sealed, visible) in header {
        if sealed != visible {
            return Err(KeysError::EnvelopeMismatch(field.to_string()));
        }
    }
    if payload.exp != envelope.expires_at {
        return Err(KeysError::EnvelopeMismatch("expires_at".into()));
    }
    if now >= payload.exp {
        return Err(KeysError::EnvelopeExpired);
    }

    let raw = Zeroizing::new(decode_field("key", &payload.key)?);
    let mut out = Zeroizing::new([0u8; 32]);
    if raw.len() != out.len() {
        return Err(KeysError::InvalidKey(format!(
            "wrapped key must be 32 bytes, got {}",
            raw.len()
        )));
    }
    out.copy_from_slice(&raw);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn claims() -> CapabilityClaims {
        CapabilityClaims {
            iss: "sdn-license".into(),
            sub: "xpub-test".into(),
            peer_id: "12D3KooWTest".into(),
            plan: "pro".into(),
            scopes: vec!["base".into(), "premium".into()],
            iat: NOW,
            exp: NOW + 900,
            jti: "jti-1".into(),
        }
    }

    fn target() -> EnvelopeTarget<'static> {
        EnvelopeTarget {
            plugin_id: "orbit.viewer",
            version: "1.2.0",
            required_scope: "premium",
            bundle_sha256: "ab12",
        }
    }

    fn build(requester: &X25519StaticSecret) -> PluginKeyEnvelope {
        build_envelope(
            &target(),
            &[7u8; 32],
            &requester.public_key(),
            &claims(),
            "sdn-license",
            NOW,
        )
        .unwrap()
    }

    #[test]
    fn test_build_then_open() {
        let requester = X25519StaticSecret::generate();
        let env = build(&requester);

        assert_eq!(env.alg, ENVELOPE_ALG);
        assert_eq!(env.expires_at, NOW + ENVELOPE_TTL_SECS);
        assert_eq!(env.capability_token_jti, "jti-1");
        assert!(!env.nonce.ends_with('='));

        let key = open_envelope(&env, &requester, NOW + 1).unwrap();
        assert_eq!(*key, [7u8; 32]);
    }

    #[test]
    fn test_aad_layout() {
        let aad = envelope_aad("sdn-license", &claims(), &target(), NOW + 120);
        assert_eq!(
            aad,
            "iss=sdn-license|sub=xpub-test|peer=12D3KooWTest|jti=jti-1|plugin=orbit.viewer\
             |version=1.2.0|sha256=ab12|scope=premium|exp=1700000120"
        );
    }

    #[test]
    fn test_associated_data_is_plain_aad() {
        let requester = X25519StaticSecret::generate();
        let env = build(&requester);
        assert_eq!(
            env.associated_data,
            envelope_aad("sdn-license", &claims(), &target(), env.expires_at)
        );
        assert!(env.associated_data.starts_with("iss=sdn-license|sub=xpub-test|"));
    }

    #[test]
    fn test_expiry_capped_by_token() {
        let mut c = claims();
        c.exp = NOW + 30;
        let requester = X25519StaticSecret::generate();
        let env = build_envelope(&target(), &[1u8; 32], &requester.public_key(), &c, "i", NOW)
            .unwrap();
        assert_eq!(env.expires_at, NOW + 30);
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut c = claims();
        c.exp = NOW;
        let requester = X25519StaticSecret::generate();
        assert!(matches!(
            build_envelope(&target(), &[1u8; 32], &requester.public_key(), &c, "i", NOW),
            Err(KeysError::TokenExpired)
        ));
    }

    #[test]
    fn test_low_order_requester_rejected() {
        let zero = X25519PublicKey::from_bytes([0u8; 32]);
        assert!(matches!(
            build_envelope(&target(), &[1u8; 32], &zero, &claims(), "i", NOW),
            Err(KeysError::NonContributory)
        ));
    }

    fn flip_b64(field: &str, index: usize) -> String {
        let mut raw = STANDARD_NO_PAD.decode(field).unwrap();
        let i = index % raw.len();
        raw[i] ^= 0x01;
        STANDARD_NO_PAD.encode(raw)
    }

    #[test]
    fn test_any_byte_change_fails() {
        let requester = X25519StaticSecret::generate();
        let env = build(&requester);

        let ct_len = STANDARD_NO_PAD.decode(&env.ciphertext).unwrap().len();
        for i in 0..ct_len {
            let mut t = env.clone();
            t.ciphertext = flip_b64(&env.ciphertext, i);
            assert!(open_envelope(&t, &requester, NOW).is_err());
        }
        for i in 0..12 {
            let mut t = env.clone();
            t.nonce = flip_b64(&env.nonce, i);
            assert!(open_envelope(&t, &requester, NOW).is_err());
        }
        for i in 0..env.associated_data.len() {
            let mut raw = env.associated_data.clone().into_bytes();
            raw[i] ^= 0x01;
            let mut t = env.clone();
            t.associated_data = String::from_utf8(raw).unwrap();
            assert!(open_envelope(&t, &requester, NOW).is_err());
        }
    }

    #[test]
    fn test_header_mismatch_detected() {
        let requester = X25519StaticSecret::generate();
        let mut env = build(&requester);
        env.plugin_id = "other".into();
        assert!(matches!(
            open_envelope(&env, &requester, NOW),
            Err(KeysError::EnvelopeMismatch(_))
        ));
    }

    #[test]
    fn test_wrong_requester_and_expiry() {
        let requester = X25519StaticSecret::generate();
        let env = build(&requester);

        let stranger = X25519StaticSecret::generate();
        assert!(matches!(
            open_envelope(&env, &stranger, NOW),
            Err(KeysError::Authentication(_))
        ));
        assert!(matches!(
            open_envelope(&env, &requester, NOW + ENVELOPE_TTL_SECS),
            Err(KeysError::EnvelopeExpired)
        ));
    }
}
