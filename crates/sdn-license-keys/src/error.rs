//! Error types for the key broker.

use thiserror::Error;

/// Errors from bundle decryption, key wrapping and the plugin catalog.
#[derive(Debug, Error)]
pub enum KeysError {
    /// Key material was malformed or had the wrong length.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// ECDH produced an all-zero secret (low-order peer key).
    #[error("non-contributory key agreement")]
    NonContributory,

    /// Encrypted payload did not match any known format.
    #[error("unrecognized encrypted format")]
    UnrecognizedFormat,

    /// Encrypted payload was structurally invalid.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// AEAD or MAC verification failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Key derivation error. Always fatal.
    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    /// The capability token expires before an envelope could be issued.
    #[error("capability token already expired")]
    TokenExpired,

    /// An opened envelope has expired.
    #[error("envelope expired")]
    EnvelopeExpired,

    /// Envelope header and sealed payload disagree.
    #[error("envelope mismatch: {0}")]
    EnvelopeMismatch(String),

    /// Staged envelope uses a scheme or algorithm we do not speak.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Catalog entry or catalog file is invalid.
    #[error("invalid catalog: {0}")]
    Catalog(String),

    /// Plugin is not in the registry.
    #[error("plugin not found: {0}")]
    NotFound(String),

    /// Upload signature did not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Upload exceeds the size limit.
    #[error("bundle too large: {size} bytes exceeds {limit}")]
    TooLarge { size: usize, limit: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] sdn_license_core::CoreError),
}

impl KeysError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            KeysError::InvalidKey(_) | KeysError::NonContributory => "invalid_key",
            KeysError::UnrecognizedFormat => "unrecognized_format",
            KeysError::InvalidPayload(_) => "invalid_payload",
            KeysError::Authentication(_) => "authentication_failed",
            KeysError::EncryptionError(_) => "encryption_failed",
            KeysError::KeyDerivation(_) => "key_derivation_failed",
            KeysError::TokenExpired => "token_expired",
            KeysError::EnvelopeExpired => "envelope_expired",
            KeysError::EnvelopeMismatch(_) => "envelope_mismatch",
            KeysError::UnsupportedScheme(_) => "unsupported_scheme",
            KeysError::SerializationError(_) => "serialization_error",
            KeysError::Catalog(_) => "invalid_catalog",
            KeysError::NotFound(_) => "not_found",
            KeysError::InvalidSignature(_) => "invalid_signature",
            KeysError::TooLarge { .. } => "bundle_too_large",
            KeysError::Io(_) => "io_error",
            KeysError::CoreError(_) => "invalid_key",
        }
    }
}

/// Result type for key broker operations.
pub type Result<T> = std::result::Result<T, KeysError>;
