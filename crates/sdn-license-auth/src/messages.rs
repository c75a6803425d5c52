//! Handshake wire messages.
//!
//! Every message is one JSON object on one line, discriminated by `type`.
//! Missing fields deserialize as empty so that they are reported as
//! `invalid_request` rather than `invalid_json`.

use serde::{Deserialize, Serialize};

use sdn_license_store::Entitlement;

use crate::error::{AuthError, Result};

/// Stream protocol identifier.
pub const PROTOCOL_ID: &str = "/sdn/license/1.0.0";

/// Ask for a challenge bound to a wallet, peer and key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeRequest {
    pub req_id: String,
    pub xpub: String,
    pub peer_id: String,
    pub client_pubkey_hex: String,
    pub ts: i64,
}

/// Prove possession of the challenged key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofRequest {
    pub req_id: String,
    pub xpub: String,
    pub peer_id: String,
    /// The challenge as received, unpadded standard base64.
    pub challenge: String,
    pub signature_hex: String,
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub req_id: String,
    pub challenge: String,
    pub expires_at: i64,
    pub server_peer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantResponse {
    pub req_id: String,
    pub entitlement: Entitlement,
    pub capability_token: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&AuthError> for ErrorResponse {
    fn from(err: &AuthError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Client to node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    ChallengeRequest(ChallengeRequest),
    ProofRequest(ProofRequest),
}

/// Node to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    ChallengeResponse(ChallengeResponse),
    GrantResponse(GrantResponse),
    ErrorResponse(ErrorResponse),
}

impl Response {
    pub fn error(err: &AuthError) -> Self {
        Response::ErrorResponse(ErrorResponse::from(err))
    }
}

const REQUEST_TYPES: &[&str] = &["challenge_request", "proof_request"];

impl Request {
    /// Parse one request line.
    ///
    /// The `type` is checked before the body so an unknown type is reported
    /// as `unsupported_type` even when the rest would not parse. A known type
    /// with a malformed body is `invalid_request`.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(line).map_err(|e| AuthError::InvalidJson(e.to_string()))?;
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        if !REQUEST_TYPES.contains(&kind.as_str()) {
            return Err(AuthError::UnsupportedType(kind));
        }
        serde_json::from_value(value).map_err(|e| AuthError::InvalidRequest(e.to_string()))
    }

    pub fn req_id(&self) -> &str {
        match self {
            Request::ChallengeRequest(r) => &r.req_id,
            Request::ProofRequest(r) => &r.req_id,
        }
    }
}
