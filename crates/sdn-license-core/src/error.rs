//! Error types for SDN License Core.

use thiserror::Error;

/// Errors from key handling and decoding.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("key decoding error: {0}")]
    KeyDecoding(String),

    #[error("encoding error: {0}")]
    EncodingError(String),
}

/// Errors from capability token signing, parsing and verification.
///
/// Each variant maps to a stable wire code via [`TokenError::code`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("missing authorization header")]
    MissingAuthorization,

    #[error("invalid authorization header")]
    InvalidAuthorization,

    #[error("invalid token format")]
    InvalidFormat,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token issuer mismatch")]
    IssuerMismatch,

    #[error("token peer_id mismatch")]
    PeerIdMismatch,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("token expired")]
    Expired,

    #[error("token missing required scope: {0}")]
    MissingScope(String),

    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl TokenError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::MissingAuthorization => "missing_authorization",
            TokenError::InvalidAuthorization => "invalid_authorization",
            TokenError::InvalidFormat => "invalid_token_format",
            TokenError::InvalidSignature => "invalid_token_signature",
            TokenError::IssuerMismatch => "token_issuer_mismatch",
            TokenError::PeerIdMismatch => "token_peer_id_mismatch",
            TokenError::NotYetValid => "token_not_yet_valid",
            TokenError::Expired => "token_expired",
            TokenError::MissingScope(_) => "token_missing_scope",
            TokenError::Encoding(_) => "token_encoding_failed",
        }
    }
}
