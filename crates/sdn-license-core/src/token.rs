//! Compact capability tokens.
//!
//! A token is `b64url(header) "." b64url(claims) "." b64url(signature)`,
//! all segments unpadded. The header is fixed to `{"alg":"EdDSA","typ":"JWT"}`
//! and the signature is Ed25519 over the first two segments joined by a dot.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::TokenError;

/// Clock tolerance applied to `iat` and `exp`.
pub const DEFAULT_VERIFY_LEEWAY_SECS: i64 = 30;

const TOKEN_ALG: &str = "EdDSA";
const TOKEN_TYP: &str = "JWT";

/// Server-signed claims authorizing a subscriber's capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityClaims {
    /// Issuer.
    pub iss: String,
    /// Subject: the wallet xpub.
    pub sub: String,
    /// Peer the token is bound to.
    pub peer_id: String,
    pub plan: String,
    pub scopes: Vec<String>,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expires at (Unix seconds).
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
}

impl CapabilityClaims {
    /// Exact-match scope lookup.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

#[derive(Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Options for [`verify_token`].
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Current time (Unix seconds).
    pub now: i64,
    /// Tolerance in seconds; values `<= 0` use [`DEFAULT_VERIFY_LEEWAY_SECS`].
    pub leeway: i64,
    /// Expected issuer; empty skips the check.
    pub issuer: String,
    /// Expected peer binding; empty skips the check.
    pub expected_peer_id: String,
    /// Scopes that must all be present.
    pub required_scopes: Vec<String>,
}

/// Sign `claims` with the node key.
pub fn sign_token(claims: &CapabilityClaims, keypair: &Keypair) -> Result<String, TokenError> {
    let header = TokenHeader {
        alg: TOKEN_ALG.to_string(),
        typ: TOKEN_TYP.to_string(),
    };
    let header_json =
        serde_json::to_vec(&header).map_err(|e| TokenError::Encoding(e.to_string()))?;
    let claims_json =
        serde_json::to_vec(claims).map_err(|e| TokenError::Encoding(e.to_string()))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(claims_json)
    );
    let signature = keypair.sign(signing_input.as_bytes());

    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature.as_bytes())
    ))
}

/// Verify a token's signature and claims.
///
/// Checks run in a fixed order and the first failure is reported:
/// format, signature, claims decoding, issuer, peer, not-before, expiry,
/// then each required scope.
pub fn verify_token(
    token: &str,
    public_key: &Ed25519PublicKey,
    opts: &VerifyOptions,
) -> Result<CapabilityClaims, TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [header_b64, claims_b64, signature_b64] = parts.as_slice() else {
        return Err(TokenError::InvalidFormat);
    };

    let signature_bytes = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| TokenError::InvalidFormat)?;
    let signature =
        Ed25519Signature::from_slice(&signature_bytes).map_err(|_| TokenError::InvalidSignature)?;
    let signing_input = format!("{header_b64}.{claims_b64}");
    public_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let claims_json = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|_| TokenError::InvalidFormat)?;
    let claims: CapabilityClaims =
        serde_json::from_slice(&claims_json).map_err(|_| TokenError::InvalidFormat)?;

    let leeway = if opts.leeway <= 0 {
        DEFAULT_VERIFY_LEEWAY_SECS
    } else {
        opts.leeway
    };

    if !opts.issuer.is_empty() && claims.iss != opts.issuer {
        return Err(TokenError::IssuerMismatch);
    }
    if !opts.expected_peer_id.is_empty() && claims.peer_id != opts.expected_peer_id {
        return Err(TokenError::PeerIdMismatch);
    }
    if claims.iat > opts.now + leeway {
        return Err(TokenError::NotYetValid);
    }
    if claims.exp <= opts.now - leeway {
        return Err(TokenError::Expired);
    }
    for required in &opts.required_scopes {
        if !claims.has_scope(required) {
            return Err(TokenError::MissingScope(required.clone()));
        }
    }

    Ok(claims)
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer_token(header: &str) -> Result<&str, TokenError> {
    let header = header.trim();
    if header.is_empty() {
        return Err(TokenError::MissingAuthorization);
    }
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(TokenError::InvalidAuthorization)?
        .trim();
    if token.is_empty() {
        return Err(TokenError::InvalidAuthorization);
    }
    Ok(token)
}

/// Verifies tokens issued by one node.
#[derive(Clone)]
pub struct TokenVerifier {
    public_key: Ed25519PublicKey,
    issuer: String,
    leeway: i64,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    pub fn new(public_key: Ed25519PublicKey, issuer: impl Into<String>) -> Self {
        Self {
            public_key,
            issuer: issuer.into(),
            leeway: DEFAULT_VERIFY_LEEWAY_SECS,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_leeway(mut self, leeway_secs: i64) -> Self {
        self.leeway = leeway_secs;
        self
    }

    pub fn public_key(&self) -> &Ed25519PublicKey {
        &self.public_key
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Verify a bearer token taken from an `Authorization` header.
    pub fn verify_authorization_header(
        &self,
        header: &str,
        expected_peer_id: &str,
        required_scopes: &[String],
    ) -> Result<CapabilityClaims, TokenError> {
        let token = extract_bearer_token(header)?;
        self.verify(token, expected_peer_id, required_scopes)
    }

    pub fn verify(
        &self,
        token: &str,
        expected_peer_id: &str,
        required_scopes: &[String],
    ) -> Result<CapabilityClaims, TokenError> {
        let opts = VerifyOptions {
            now: self.clock.now(),
            leeway: self.leeway,
            issuer: self.issuer.clone(),
            expected_peer_id: expected_peer_id.trim().to_string(),
            required_scopes: required_scopes.to_vec(),
        };
        verify_token(token, &self.public_key, &opts)
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("public_key", &self.public_key)
            .field("issuer", &self.issuer)
            .field("leeway", &self.leeway)
            .finish()
    }
}
