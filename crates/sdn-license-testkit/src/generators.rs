//! Proptest generators for property-based testing.

use proptest::prelude::*;

use sdn_license_core::scopes::KNOWN_PLANS;
use sdn_license_core::{scopes_for_plan, CapabilityClaims, Keypair};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// One of the assignable plans.
pub fn plan() -> impl Strategy<Value = String> {
    prop::sample::select(KNOWN_PLANS).prop_map(String::from)
}

/// Generate a wallet identifier.
pub fn xpub() -> impl Strategy<Value = String> {
    "xpub[1-9A-Za-z]{8,40}".prop_map(String::from)
}

pub fn plugin_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9._-]{0,23}".prop_map(String::from)
}

pub fn content_key() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>()
}

/// Generate a bundle body.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Parameters for a capability token.
#[derive(Debug, Clone)]
pub struct TokenParams {
    pub node: Keypair,
    pub client: Keypair,
    pub xpub: String,
    pub plan: String,
    pub iat: i64,
    pub ttl: i64,
    pub jti: String,
}

impl TokenParams {
    pub fn claims(&self, issuer: &str) -> CapabilityClaims {
        CapabilityClaims {
            iss: issuer.to_string(),
            sub: self.xpub.clone(),
            peer_id: self.client.peer_id(),
            plan: self.plan.clone(),
            scopes: scopes_for_plan(&self.plan),
            iat: self.iat,
            exp: self.iat + self.ttl,
            jti: self.jti.clone(),
        }
    }
}

impl Arbitrary for TokenParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            keypair(),
            keypair(),
            xpub(),
            plan(),
            1_600_000_000i64..=2_000_000_000i64,
            1i64..=3600i64,
            "[0-9a-f]{32}",
        )
            .prop_map(|(node, client, xpub, plan, iat, ttl, jti)| TokenParams {
                node,
                client,
                xpub,
                plan,
                iat,
                ttl,
                jti,
            })
            .boxed()
    }
}
