//! # SDN License Auth
//!
//! Challenge-response handshake that turns possession of an Ed25519 key,
//! bound to a wallet and a libp2p peer id, into a capability token.
//!
//! ## Message Flow
//!
//! ```text
//! Client                                   Node
//!   |--- challenge_request --------------->|  check ts, key, peer id
//!   |<-- challenge_response ---------------|  32 random bytes, 60s
//!   |--- proof_request (signature) ------->|  consume challenge, verify
//!   |<-- grant_response (token) -----------|  entitlement -> scopes
//! ```
//!
//! Each exchange is a single newline-terminated JSON object on its own
//! stream ([`PROTOCOL_ID`]). Failures are `error_response {code, message}`.

pub mod authenticator;
pub mod challenge;
pub mod error;
pub mod messages;
pub mod transport;

pub use authenticator::{AuthConfig, Authenticator};
pub use challenge::{ChallengeTable, PendingChallenge, DEFAULT_MAX_PENDING};
pub use error::{AuthError, Result};
pub use messages::{
    ChallengeRequest, ChallengeResponse, ErrorResponse, GrantResponse, ProofRequest, Request,
    Response, PROTOCOL_ID,
};
pub use transport::{
    read_line, send_request, serve_stream, serve_tcp, write_line, StreamConfig,
    DEFAULT_MAX_REQUEST_BYTES, DEFAULT_READ_TIMEOUT,
};
