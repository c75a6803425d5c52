//! Error types for the license service.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sdn_license_auth::AuthError;
use sdn_license_core::{CoreError, TokenError};
use sdn_license_keys::KeysError;
use sdn_license_store::StoreError;

/// Errors from opening or running the service.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Configuration could not be read or is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Signing or node key file is unusable.
    #[error("key file error: {0}")]
    KeyFile(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("key broker error: {0}")]
    Keys(#[from] KeysError),

    #[error("handshake error: {0}")]
    Auth(#[from] AuthError),
}

/// Result type for service setup.
pub type Result<T> = std::result::Result<T, LicenseError>;

/// An HTTP-shaped failure: status plus `{code, message}` body.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{status} {code}: {message}")]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(code: &str, message: impl Into<String>) -> Self {
        Self::new(400, code, message)
    }

    pub fn unauthorized(code: &str, message: impl Into<String>) -> Self {
        Self::new(401, code, message)
    }

    pub fn forbidden(code: &str, message: impl Into<String>) -> Self {
        Self::new(403, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, "not_found", message)
    }

    pub fn conflict(code: &str, message: impl Into<String>) -> Self {
        Self::new(409, code, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, "internal_error", message)
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::unauthorized(err.code(), err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingField(_) | StoreError::InvalidData(_) => {
                ApiError::bad_request("invalid_request", err.to_string())
            }
            other => {
                tracing::error!(error = %other, "entitlement store failure");
                ApiError::internal("entitlement store unavailable")
            }
        }
    }
}

impl From<KeysError> for ApiError {
    fn from(err: KeysError) -> Self {
        let code = err.code();
        match err {
            KeysError::NotFound(_) => ApiError::not_found(err.to_string()),
            KeysError::TokenExpired => ApiError::unauthorized(code, err.to_string()),
            KeysError::TooLarge { .. } => ApiError::new(413, code, err.to_string()),
            KeysError::InvalidSignature(_)
            | KeysError::InvalidPayload(_)
            | KeysError::Catalog(_)
            | KeysError::CoreError(_) => ApiError::bad_request(code, err.to_string()),
            other => {
                tracing::error!(error = %other, code, "key broker failure");
                ApiError::new(500, code, "key broker failure")
            }
        }
    }
}
