//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: handshake clients and plugin
//! roots on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde_json::json;

use sdn_license::{LicenseConfig, LicenseService};
use sdn_license_auth::{
    Authenticator, ChallengeRequest, ChallengeResponse, GrantResponse, ProofRequest, Request,
    Response,
};
use sdn_license_core::{Clock, Keypair};
use sdn_license_keys::{
    encrypt_bundle_v1, encrypt_bundle_v2, PluginRegistry, X25519PublicKey, X25519StaticSecret,
};
use sdn_license_store::MemoryEntitlementStore;

/// A handshake client: an Ed25519 identity and a wallet.
pub struct TestClient {
    pub keypair: Keypair,
    pub xpub: String,
}

impl TestClient {
    /// Create a client with a random keypair.
    pub fn new(xpub: &str) -> Self {
        Self {
            keypair: Keypair::generate(),
            xpub: xpub.to_string(),
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(xpub: &str, seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
            xpub: xpub.to_string(),
        }
    }

    pub fn peer_id(&self) -> String {
        self.keypair.peer_id()
    }

    pub fn challenge_request(&self, req_id: &str, ts: i64) -> Request {
        Request::ChallengeRequest(ChallengeRequest {
            req_id: req_id.to_string(),
            xpub: self.xpub.clone(),
            peer_id: self.peer_id(),
            client_pubkey_hex: self.keypair.public_key().to_hex(),
            ts,
        })
    }

    /// Sign the challenge and build the proof.
    pub fn proof_request(&self, challenge: &ChallengeResponse, ts: i64) -> Request {
        let raw = STANDARD_NO_PAD
            .decode(&challenge.challenge)
            .unwrap_or_default();
        Request::ProofRequest(ProofRequest {
            req_id: challenge.req_id.clone(),
            xpub: self.xpub.clone(),
            peer_id: self.peer_id(),
            challenge: challenge.challenge.clone(),
            signature_hex: self.keypair.sign(&raw).to_hex(),
            ts,
        })
    }

    /// Run both handshake steps directly against `auth`.
    pub async fn handshake(
        &self,
        auth: &Authenticator,
        req_id: &str,
        ts: i64,
    ) -> Result<GrantResponse, Response> {
        let challenge = match auth.handle(&self.challenge_request(req_id, ts)).await {
            Response::ChallengeResponse(c) => c,
            other => return Err(other),
        };
        match auth.handle(&self.proof_request(&challenge, ts)).await {
            Response::GrantResponse(g) => Ok(g),
            other => Err(other),
        }
    }
}

/// Create `count` clients with distinct wallets.
pub fn multi_party_clients(count: usize) -> Vec<TestClient> {
    (0..count)
        .map(|i| TestClient::new(&format!("xpub-party-{}", i)))
        .collect()
}

/// Inventory bundle layout used by [`PluginRoot::add_encrypted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleLayout {
    V1,
    V2,
}

/// A plugin root in a temporary directory, with a node inventory key.
pub struct PluginRoot {
    dir: tempfile::TempDir,
    pub node_secret_bytes: [u8; 32],
    entries: Vec<serde_json::Value>,
}

impl PluginRoot {
    pub fn new() -> Self {
        let mut node_secret_bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut node_secret_bytes);
        Self {
            dir: tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {}", e)),
            node_secret_bytes,
            entries: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn node_secret(&self) -> X25519StaticSecret {
        X25519StaticSecret::from_bytes(self.node_secret_bytes)
    }

    pub fn node_public(&self) -> X25519PublicKey {
        self.node_secret().public_key()
    }

    fn write(&self, relative: &str, data: &[u8]) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("mkdir: {}", e));
        }
        std::fs::write(&path, data).unwrap_or_else(|e| panic!("write {}: {}", relative, e));
        path
    }

    /// Add a plugin encrypted to the node key, with `content_key` as its
    /// envelope key.
    pub fn add_encrypted(
        &mut self,
        id: &str,
        version: &str,
        required_scope: &str,
        plaintext: &[u8],
        content_key: [u8; 32],
        layout: BundleLayout,
    ) -> &mut Self {
        let bundle = match layout {
            BundleLayout::V2 => encrypt_bundle_v2(plaintext, &self.node_public()),
            BundleLayout::V1 => encrypt_bundle_v1(plaintext, &self.node_public()),
        }
        .unwrap_or_else(|e| panic!("encrypt {}: {}", id, e));

        let enc = format!("{}/bundle.enc", id);
        let key = format!("{}/bundle.key", id);
        self.write(&enc, &bundle);
        self.write(&key, hex::encode(content_key).as_bytes());
        self.entries.push(json!({
            "id": id,
            "version": version,
            "required_scope": required_scope,
            "encrypted_path": enc,
            "key_path": key,
        }));
        self
    }

    /// Add a plugin served as-is.
    pub fn add_plain(&mut self, id: &str, version: &str, data: &[u8]) -> &mut Self {
        let plain = format!("{}/bundle.wasm", id);
        self.write(&plain, data);
        self.entries.push(json!({
            "id": id,
            "version": version,
            "plain_path": plain,
        }));
        self
    }

    /// Write `catalog.json` from the entries added so far.
    pub fn write_catalog(&self) -> &Self {
        let catalog = json!({ "plugins": self.entries });
        self.write("catalog.json", catalog.to_string().as_bytes());
        self
    }

    /// Write the catalog and open a registry holding the node key.
    pub fn registry(&self) -> Arc<PluginRegistry> {
        self.write_catalog();
        let registry = PluginRegistry::open(self.path(), Some(self.node_secret()))
            .unwrap_or_else(|e| panic!("open registry: {}", e));
        Arc::new(registry)
    }
}

/// A service over a [`PluginRoot`] with an in-memory entitlement store.
pub struct TestService {
    pub service: LicenseService,
    pub node: Keypair,
    pub store: Arc<MemoryEntitlementStore>,
}

impl TestService {
    /// Build on `root` with a random node key and the given clock.
    pub fn new(root: &PluginRoot, config: LicenseConfig, clock: Arc<dyn Clock>) -> Self {
        let node = Keypair::generate();
        let store = Arc::new(MemoryEntitlementStore::with_clock(clock.clone()));
        let service =
            LicenseService::from_parts(config, node.clone(), store.clone(), root.registry(), clock);
        Self {
            service,
            node,
            store,
        }
    }
}

impl Default for PluginRoot {
    fn default() -> Self {
        Self::new()
    }
}
