//! Error types for the license handshake.

use thiserror::Error;

use sdn_license_core::TokenError;
use sdn_license_store::StoreError;

/// Errors returned to handshake clients. Each has a stable [`code`](AuthError::code).
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required field is missing or empty.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Client timestamp missing or outside the allowed skew.
    #[error("timestamp outside allowed skew")]
    InvalidTimestamp,

    /// Client public key is not a 32-byte Ed25519 point.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Claimed peer id does not derive from the public key.
    #[error("peer id does not match public key")]
    PeerIdMismatch,

    /// Challenge is not valid base64.
    #[error("invalid challenge encoding")]
    InvalidChallenge,

    /// Signature is not 64 bytes of hex.
    #[error("invalid signature encoding")]
    InvalidSignature,

    /// No pending challenge for this request id.
    #[error("challenge not found")]
    ChallengeNotFound,

    #[error("challenge expired")]
    ChallengeExpired,

    /// Proof does not belong to the stored challenge.
    #[error("challenge mismatch")]
    ChallengeMismatch,

    /// Signature does not verify under the challenged key.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// The wallet's entitlement is not active.
    #[error("entitlement inactive")]
    EntitlementInactive,

    /// Too many outstanding challenges.
    #[error("too many pending challenges")]
    CapacityExceeded,

    /// Request line is not JSON.
    #[error("invalid json: {0}")]
    InvalidJson(String),

    /// Request `type` is not recognized.
    #[error("unsupported message type: {0}")]
    UnsupportedType(String),

    /// Request line exceeds the size bound.
    #[error("request exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },

    /// No complete request before the read deadline.
    #[error("timed out reading request")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entitlement lookup failed.
    #[error("entitlement store error: {0}")]
    Store(#[from] StoreError),

    /// Token minting failed.
    #[error("token error: {0}")]
    Token(#[from] TokenError),
}

impl AuthError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::InvalidTimestamp => "invalid_timestamp",
            AuthError::InvalidPublicKey(_) => "invalid_public_key",
            AuthError::PeerIdMismatch => "peer_id_mismatch",
            AuthError::InvalidChallenge => "invalid_challenge",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::ChallengeNotFound => "challenge_not_found",
            AuthError::ChallengeExpired => "challenge_expired",
            AuthError::ChallengeMismatch => "challenge_mismatch",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::EntitlementInactive => "entitlement_inactive",
            AuthError::CapacityExceeded => "challenge_capacity_exceeded",
            AuthError::InvalidJson(_) => "invalid_json",
            AuthError::UnsupportedType(_) => "unsupported_type",
            AuthError::RequestTooLarge { .. } => "request_too_large",
            AuthError::Timeout => "request_timeout",
            AuthError::Io(_) => "io_error",
            AuthError::Store(_) => "entitlement_unavailable",
            AuthError::Token(e) => e.code(),
        }
    }
}

/// Result type for handshake operations.
pub type Result<T> = std::result::Result<T, AuthError>;
