//! Golden test vectors.
//!
//! Fixed inputs with outputs computed by an independent implementation.
//! Any change to token encoding, peer id derivation or the bundle and staged
//! layouts shows up here first.

use sdn_license_core::{CapabilityClaims, Keypair};
use sdn_license_keys::X25519StaticSecret;

/// A signed capability token from a fixed node seed.
#[derive(Debug, Clone)]
pub struct TokenVector {
    pub name: &'static str,
    pub node_seed: [u8; 32],
    pub node_public_key_hex: &'static str,
    pub node_peer_id: &'static str,
    pub client_seed: [u8; 32],
    pub client_peer_id: &'static str,
    pub expected_token: &'static str,
}

impl TokenVector {
    pub fn node_keypair(&self) -> Keypair {
        Keypair::from_seed(&self.node_seed)
    }

    pub fn client_keypair(&self) -> Keypair {
        Keypair::from_seed(&self.client_seed)
    }

    /// The claims the expected token carries.
    pub fn claims(&self) -> CapabilityClaims {
        CapabilityClaims {
            iss: "sdn-license".into(),
            sub: "xpub-golden".into(),
            peer_id: self.client_peer_id.into(),
            plan: "pro".into(),
            scopes: ["read:free", "base", "read:premium", "premium"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            iat: 1_700_000_000,
            exp: 1_700_000_900,
            jti: "00000000-0000-4000-8000-000000000001".into(),
        }
    }
}

pub fn token_vector() -> TokenVector {
    TokenVector {
        name: "pro plan token",
        node_seed: [0x42; 32],
        node_public_key_hex: "2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12",
        node_peer_id: "12D3KooWC4T1AXU2s2YBgGJ2FeaYVtsKoHZWJeubnWe9SnuSE7Zb",
        client_seed: [0x07; 32],
        client_peer_id: "12D3KooWRawPbxPtP1eZaJpumGnyWX2DcUyd3RQnydr3eAto4Az7",
        expected_token: concat!(
            "eyJhbGciOiJFZERTQSIsInR5cCI6IkpXVCJ9.",
            "eyJpc3MiOiJzZG4tbGljZW5zZSIsInN1YiI6InhwdWItZ29sZGVuIiwicGVlcl9pZCI6IjEyRDNLb29XUmF3",
            "UGJ4UHRQMWVaYUpwdW1HbnlXWDJEY1V5ZDNSUW55ZHIzZUF0bzRBejciLCJwbGFuIjoicHJvIiwic2NvcGVz",
            "IjpbInJlYWQ6ZnJlZSIsImJhc2UiLCJyZWFkOnByZW1pdW0iLCJwcmVtaXVtIl0sImlhdCI6MTcwMDAwMDAw",
            "MCwiZXhwIjoxNzAwMDAwOTAwLCJqdGkiOiIwMDAwMDAwMC0wMDAwLTQwMDAtODAwMC0wMDAwMDAwMDAwMDEifQ.",
            "H1WkAYc_TTKP56YaaoiQhbGc6ToKRa5I_KPzXJrH77Jnf-cSvZLYuERF6HunNHz_uNVgK8uOO_liJ0jy5Bl-DA",
        ),
    }
}

/// Node inventory key shared by the bundle and staged vectors.
pub const NODE_X25519_SECRET: [u8; 32] = [0x11; 32];
pub const NODE_X25519_PUBLIC_HEX: &str =
    "7b4e909bbe7ffe44c465a220037d608ee35897d31ef972f07f74892cb0f73f13";

pub fn node_x25519_secret() -> X25519StaticSecret {
    X25519StaticSecret::from_bytes(NODE_X25519_SECRET)
}

/// An inventory bundle encrypted to [`NODE_X25519_SECRET`].
#[derive(Debug, Clone)]
pub struct BundleVector {
    pub name: &'static str,
    pub version: u8,
    pub bundle_hex: &'static str,
    pub plaintext: &'static [u8],
    pub plaintext_sha256: &'static str,
}

pub fn bundle_vectors() -> Vec<BundleVector> {
    vec![
        BundleVector {
            name: "V2 gcm",
            version: 2,
            bundle_hex: concat!(
                "020faa684ed28867b97f4a6a2dee5df8ce974e76b7018e3f22a1c4cf2678570f20",
                "333333333333333333333333",
                "dbb3bf8de77c46cff9d08e39e01f9043",
                "cd25586e5d284df48e77f0699184f43dd577346f",
            ),
            plaintext: b"golden plugin bundle",
            plaintext_sha256: "9016e81fcc9a596a9b758e586de97a3b64447e4865c8977f23e74f7e8d479f7d",
        },
        BundleVector {
            name: "V1 ctr+hmac",
            version: 1,
            bundle_hex: concat!(
                "ff2ee45601ec1b67310c7790404585ae697331eee1c1f8cf2419731c1fff3e6b",
                "55555555555555555555555555555555",
                "82eca39101f93f0bce34812b5f7ba36dbf9c54521ba988e5f2c1d1de28faff33",
                "1a637a0b45c1bfa1440b6cb7b7be7c0789a715d5",
            ),
            plaintext: b"golden plugin bundle",
            plaintext_sha256: "9016e81fcc9a596a9b758e586de97a3b64447e4865c8977f23e74f7e8d479f7d",
        },
    ]
}

impl BundleVector {
    pub fn bundle(&self) -> Vec<u8> {
        hex::decode(self.bundle_hex).unwrap_or_default()
    }
}

/// A staged artifact wrapped with the legacy label, mixed base64 alphabets
/// and padding.
pub const STAGED_ARTIFACT_JSON: &str = r#"{"keyEncryption":{"scheme":"ecies-x25519-hkdf-sha256-aes-256-gcm","ephemeralPublicKeyHex":"219e4d800da968d2a5fcb009c784f4746c7138edb9ee4844b739e830b05cf424","hkdfSaltB64":"d3d3d3d3d3d3d3d3d3d3d3d3d3d3d3d3d3d3d3d3d3c=","wrapIvB64":"mZmZmZmZmZmZmZmZ","wrappedKeyB64":"eUp/++vQP8dNsbqJFxsKeuVltnlreGfEt+V/ytbSbO8","wrappedKeyTagB64":"fp6o3bdUPcZfCfWa9lVoxg"},"contentEncryption":{"algorithm":"aes-256-gcm","ivB64":"qqqqqqqqqqqqqqqq","tagB64":"uKJEi7TTz+x7GLwJdxM0uQ","ciphertextB64":"5VnucH1Tt9+ljG3FwjSP/EOMLKFHXQ"}}"#;
pub const STAGED_PLAINTEXT: &[u8] = b"golden staged artifact";
