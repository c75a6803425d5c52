//! Challenge-response authentication.
//!
//! Proves that a client holds the Ed25519 key behind its libp2p peer id and
//! exchanges that proof, plus the wallet's entitlement, for a capability
//! token signed by the node.

use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use rand::RngCore;
use subtle::ConstantTimeEq;

use sdn_license_core::{
    decode_hex_exact, scopes_for_plan, sign_token, strip_hex_prefix, CapabilityClaims, Clock,
    Ed25519PublicKey, Ed25519Signature, Keypair, SystemClock, TokenVerifier,
};
use sdn_license_store::EntitlementResolver;

use crate::challenge::{ChallengeTable, PendingChallenge, DEFAULT_MAX_PENDING};
use crate::error::{AuthError, Result};
use crate::messages::{
    ChallengeRequest, ChallengeResponse, GrantResponse, ProofRequest, Request, Response,
};

/// Handshake timing and identity settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Issuer written into every token.
    pub issuer: String,
    /// Seconds a challenge stays valid.
    pub challenge_ttl_secs: i64,
    /// Upper bound on token lifetime.
    pub token_ttl_secs: i64,
    /// Allowed distance between client and node clocks.
    pub clock_skew_secs: i64,
    /// Bound on outstanding challenges.
    pub max_pending: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "sdn-license".to_string(),
            challenge_ttl_secs: 60,
            token_ttl_secs: 15 * 60,
            clock_skew_secs: 2 * 60,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

/// Issues challenges and turns valid proofs into capability tokens.
pub struct Authenticator {
    keypair: Arc<Keypair>,
    server_peer_id: String,
    resolver: Arc<dyn EntitlementResolver>,
    challenges: ChallengeTable,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

fn required(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuthError::InvalidRequest(format!("missing {}", field)));
    }
    Ok(trimmed.to_string())
}

fn decode_challenge(value: &str) -> Result<Vec<u8>> {
    let value = value.trim();
    STANDARD_NO_PAD
        .decode(value)
        .or_else(|_| STANDARD.decode(value))
        .map_err(|_| AuthError::InvalidChallenge)
}

impl Authenticator {
    pub fn new(
        keypair: Arc<Keypair>,
        resolver: Arc<dyn EntitlementResolver>,
        config: AuthConfig,
    ) -> Self {
        Self::with_clock(keypair, resolver, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        keypair: Arc<Keypair>,
        resolver: Arc<dyn EntitlementResolver>,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let server_peer_id = keypair.peer_id();
        let challenges = ChallengeTable::new(clock.clone(), config.max_pending);
        Self {
            keypair,
            server_peer_id,
            resolver,
            challenges,
            clock,
            config,
        }
    }

    /// This node's libp2p peer id.
    pub fn server_peer_id(&self) -> &str {
        &self.server_peer_id
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn challenges(&self) -> &ChallengeTable {
        &self.challenges
    }

    /// A verifier for tokens this authenticator issues.
    pub fn verifier(&self) -> TokenVerifier {
        TokenVerifier::new(self.keypair.public_key(), self.config.issuer.clone())
            .with_clock(self.clock.clone())
    }

    fn check_timestamp(&self, ts: i64, now: i64) -> Result<()> {
        if ts <= 0 || (now - ts).abs() > self.config.clock_skew_secs {
            return Err(AuthError::InvalidTimestamp);
        }
        Ok(())
    }

    /// Issue a challenge for a claimed (wallet, peer, key) triple.
    pub fn issue_challenge(&self, req: &ChallengeRequest) -> Result<ChallengeResponse> {
        let req_id = required("req_id", &req.req_id)?;
        let xpub = required("xpub", &req.xpub)?;
        let peer_id = required("peer_id", &req.peer_id)?;
        let pubkey_hex = required("client_pubkey_hex", strip_hex_prefix(req.client_pubkey_hex.trim()))?;

        let now = self.clock.now();
        self.check_timestamp(req.ts, now)?;

        let public_key = decode_hex_exact::<32>(&pubkey_hex)
            .map(Ed25519PublicKey::from_bytes)
            .map_err(|e| AuthError::InvalidPublicKey(e.to_string()))?;
        public_key
            .validate()
            .map_err(|e| AuthError::InvalidPublicKey(e.to_string()))?;

        let derived = public_key
            .peer_id()
            .map_err(|e| AuthError::InvalidPublicKey(e.to_string()))?;
        if derived != peer_id {
            tracing::warn!(req_id = %req_id, claimed = %peer_id, "peer id does not match key");
            return Err(AuthError::PeerIdMismatch);
        }

        let mut challenge = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut challenge);
        let expires_at = now + self.config.challenge_ttl_secs;

        self.challenges.insert(PendingChallenge {
            req_id: req_id.clone(),
            xpub,
            peer_id,
            public_key,
            challenge,
            created_at: now,
            expires_at,
        })?;
        tracing::debug!(req_id = %req_id, expires_at, "challenge issued");

        Ok(ChallengeResponse {
            req_id,
            challenge: STANDARD_NO_PAD.encode(challenge),
            expires_at,
            server_peer_id: self.server_peer_id.clone(),
        })
    }

    /// Verify a proof and mint a capability token.
    ///
    /// The pending challenge is consumed by this call whether or not the
    /// proof succeeds.
    pub async fn verify_proof(&self, req: &ProofRequest) -> Result<GrantResponse> {
        let req_id = required("req_id", &req.req_id)?;
        let xpub = required("xpub", &req.xpub)?;
        let peer_id = required("peer_id", &req.peer_id)?;
        let challenge_b64 = required("challenge", &req.challenge)?;
        let signature_hex = required("signature_hex", &req.signature_hex)?;

        let now = self.clock.now();
        self.check_timestamp(req.ts, now)?;

        let presented = decode_challenge(&challenge_b64)?;
        let signature = decode_hex_exact::<64>(&signature_hex)
            .map(Ed25519Signature::from_bytes)
            .map_err(|_| AuthError::InvalidSignature)?;

        let pending = self.challenges.take(&req_id)?;

        if pending.xpub != xpub || pending.peer_id != peer_id {
            tracing::warn!(req_id = %req_id, "proof does not match challenged identity");
            return Err(AuthError::ChallengeMismatch);
        }
        if presented.len() != pending.challenge.len()
            || !bool::from(presented.as_slice().ct_eq(&pending.challenge))
        {
            tracing::warn!(req_id = %req_id, "proof echoes a different challenge");
            return Err(AuthError::ChallengeMismatch);
        }
        if pending.public_key.verify(&pending.challenge, &signature).is_err() {
            tracing::warn!(req_id = %req_id, "challenge signature rejected");
            return Err(AuthError::SignatureInvalid);
        }

        let entitlement = self.resolver.get_or_create(&xpub, &peer_id).await?;
        if !entitlement.is_active(now) {
            tracing::warn!(req_id = %req_id, status = %entitlement.status, "entitlement inactive");
            return Err(AuthError::EntitlementInactive);
        }

        let mut exp = now + self.config.token_ttl_secs;
        if entitlement.expires_at > 0 && entitlement.expires_at < exp {
            exp = entitlement.expires_at;
        }

        let claims = CapabilityClaims {
            iss: self.config.issuer.clone(),
            sub: xpub,
            peer_id,
            plan: entitlement.plan.clone(),
            scopes: scopes_for_plan(&entitlement.plan),
            iat: now,
            exp,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = sign_token(&claims, &self.keypair)?;
        tracing::info!(req_id = %req_id, plan = %claims.plan, jti = %claims.jti, exp, "capability token granted");

        Ok(GrantResponse {
            req_id,
            entitlement,
            capability_token: token,
            expires_at: exp,
        })
    }

    /// Dispatch one parsed request. Failures become `error_response`.
    pub async fn handle(&self, request: &Request) -> Response {
        let result = match request {
            Request::ChallengeRequest(req) => {
                self.issue_challenge(req).map(Response::ChallengeResponse)
            }
            Request::ProofRequest(req) => {
                self.verify_proof(req).await.map(Response::GrantResponse)
            }
        };
        result.unwrap_or_else(|e| Response::error(&e))
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("server_peer_id", &self.server_peer_id)
            .field("config", &self.config)
            .field("pending", &self.challenges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdn_license_core::{scopes, ManualClock};
    use sdn_license_store::{
        Entitlement, EntitlementStatus, EntitlementStore, MemoryEntitlementStore,
    };

    const NOW: i64 = 1_700_000_000;

    struct Harness {
        auth: Authenticator,
        store: Arc<MemoryEntitlementStore>,
        clock: Arc<ManualClock>,
        client: Keypair,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = Arc::new(MemoryEntitlementStore::with_clock(clock.clone()));
        let auth = Authenticator::with_clock(
            Arc::new(Keypair::generate()),
            store.clone(),
            AuthConfig::default(),
            clock.clone(),
        );
        Harness {
            auth,
            store,
            clock,
            client: Keypair::generate(),
        }
    }

    impl Harness {
        fn challenge(&self, req_id: &str) -> ChallengeResponse {
            self.auth
                .issue_challenge(&ChallengeRequest {
                    req_id: req_id.into(),
                    xpub: "xpub-test".into(),
                    peer_id: self.client.peer_id(),
                    client_pubkey_hex: self.client.public_key().to_hex(),
                    ts: self.clock.now(),
                })
                .unwrap()
        }

        fn proof(&self, resp: &ChallengeResponse) -> ProofRequest {
            let raw = STANDARD_NO_PAD.decode(&resp.challenge).unwrap();
            ProofRequest {
                req_id: resp.req_id.clone(),
                xpub: "xpub-test".into(),
                peer_id: self.client.peer_id(),
                challenge: resp.challenge.clone(),
                signature_hex: self.client.sign(&raw).to_hex(),
                ts: self.clock.now(),
            }
        }
    }

    #[tokio::test]
    async fn test_full_handshake() {
        let h = harness();
        let resp = h.challenge("r1");
        assert_eq!(resp.expires_at, NOW + 60);
        assert_eq!(resp.server_peer_id, h.auth.server_peer_id());
        assert!(!resp.challenge.ends_with('='));

        let grant = h.auth.verify_proof(&h.proof(&resp)).await.unwrap();
        assert_eq!(grant.req_id, "r1");
        assert_eq!(grant.entitlement.plan, "free");
        assert_eq!(grant.expires_at, NOW + 900);

        let claims = h
            .auth
            .verifier()
            .verify(&grant.capability_token, &h.client.peer_id(), &[])
            .unwrap();
        assert_eq!(claims.sub, "xpub-test");
        assert!(claims.has_scope(scopes::SCOPE_READ_FREE));
        assert!(claims.has_scope(scopes::SCOPE_BASE));
        assert!(!claims.has_scope(scopes::SCOPE_PREMIUM));
    }

    #[tokio::test]
    async fn test_replay_is_not_found() {
        let h = harness();
        let resp = h.challenge("r1");
        let proof = h.proof(&resp);
        h.auth.verify_proof(&proof).await.unwrap();

        let err = h.auth.verify_proof(&proof).await.unwrap_err();
        assert_eq!(err.code(), "challenge_not_found");
    }

    #[tokio::test]
    async fn test_peer_mismatch_before_signature() {
        let h = harness();
        let resp = h.challenge("r1");
        let mut proof = h.proof(&resp);
        proof.peer_id = Keypair::generate().peer_id();

        let err = h.auth.verify_proof(&proof).await.unwrap_err();
        assert_eq!(err.code(), "challenge_mismatch");
        // Consumed even on failure.
        let err = h.auth.verify_proof(&h.proof(&resp)).await.unwrap_err();
        assert_eq!(err.code(), "challenge_not_found");
    }

    #[tokio::test]
    async fn test_wrong_challenge_bytes_and_bad_signature() {
        let h = harness();
        let resp = h.challenge("r1");
        let mut proof = h.proof(&resp);
        proof.challenge = STANDARD_NO_PAD.encode([9u8; 32]);
        assert_eq!(h.auth.verify_proof(&proof).await.unwrap_err().code(), "challenge_mismatch");

        let resp = h.challenge("r2");
        let mut proof = h.proof(&resp);
        proof.signature_hex = Keypair::generate().sign(b"other").to_hex();
        assert_eq!(h.auth.verify_proof(&proof).await.unwrap_err().code(), "signature_invalid");
    }

    #[tokio::test]
    async fn test_expired_challenge() {
        let h = harness();
        let resp = h.challenge("r1");
        h.clock.advance(61);
        let proof = h.proof(&resp);
        assert_eq!(h.auth.verify_proof(&proof).await.unwrap_err().code(), "challenge_expired");
    }

    #[tokio::test]
    async fn test_encoding_errors() {
        let h = harness();
        let resp = h.challenge("r1");

        let mut proof = h.proof(&resp);
        proof.challenge = "***".into();
        assert_eq!(h.auth.verify_proof(&proof).await.unwrap_err().code(), "invalid_challenge");

        let mut proof = h.proof(&resp);
        proof.signature_hex = "abcd".into();
        assert_eq!(h.auth.verify_proof(&proof).await.unwrap_err().code(), "invalid_signature");

        // Decoding failures happen before the challenge is consumed.
        h.auth.verify_proof(&h.proof(&resp)).await.unwrap();
    }

    #[tokio::test]
    async fn test_issue_validation() {
        let h = harness();
        let base = ChallengeRequest {
            req_id: "r1".into(),
            xpub: "xpub-test".into(),
            peer_id: h.client.peer_id(),
            client_pubkey_hex: format!("0x{}", h.client.public_key().to_hex()),
            ts: NOW,
        };
        assert!(h.auth.issue_challenge(&base).is_ok());

        let mut req = base.clone();
        req.xpub = "  ".into();
        assert_eq!(h.auth.issue_challenge(&req).unwrap_err().code(), "invalid_request");

        let mut req = base.clone();
        req.ts = NOW - 121;
        assert_eq!(h.auth.issue_challenge(&req).unwrap_err().code(), "invalid_timestamp");

        let mut req = base.clone();
        req.ts = 0;
        assert_eq!(h.auth.issue_challenge(&req).unwrap_err().code(), "invalid_timestamp");

        let mut req = base.clone();
        req.client_pubkey_hex = "abcd".into();
        assert_eq!(h.auth.issue_challenge(&req).unwrap_err().code(), "invalid_public_key");

        let mut req = base.clone();
        req.peer_id = Keypair::generate().peer_id();
        assert_eq!(h.auth.issue_challenge(&req).unwrap_err().code(), "peer_id_mismatch");
    }

    #[tokio::test]
    async fn test_inactive_entitlement() {
        let h = harness();
        let mut ent = Entitlement::new_default("xpub-test", "", NOW);
        ent.status = EntitlementStatus::Suspended;
        h.store.upsert(&ent).await.unwrap();

        let resp = h.challenge("r1");
        let err = h.auth.verify_proof(&h.proof(&resp)).await.unwrap_err();
        assert_eq!(err.code(), "entitlement_inactive");
    }

    #[tokio::test]
    async fn test_premium_plan_and_expiry_cap() {
        let h = harness();
        let mut ent = Entitlement::new_default("xpub-test", "", NOW);
        ent.plan = "pro".into();
        ent.expires_at = NOW + 300;
        h.store.upsert(&ent).await.unwrap();

        let resp = h.challenge("r1");
        let grant = h.auth.verify_proof(&h.proof(&resp)).await.unwrap();
        assert_eq!(grant.expires_at, NOW + 300);

        let claims = h
            .auth
            .verifier()
            .verify(&grant.capability_token, "", &[scopes::SCOPE_PREMIUM.to_string()])
            .unwrap();
        assert_eq!(claims.plan, "pro");
        assert!(claims.has_scope(scopes::SCOPE_READ_PREMIUM));
    }

    #[tokio::test]
    async fn test_handle_maps_errors() {
        let h = harness();
        let resp = h
            .auth
            .handle(&Request::ProofRequest(ProofRequest {
                req_id: "missing".into(),
                xpub: "x".into(),
                peer_id: "p".into(),
                challenge: STANDARD_NO_PAD.encode([0u8; 32]),
                signature_hex: hex::encode([0u8; 64]),
                ts: NOW,
            }))
            .await;
        match resp {
            Response::ErrorResponse(e) => assert_eq!(e.code, "challenge_not_found"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
