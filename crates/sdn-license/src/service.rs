//! The license service: one object owning the signing key, the entitlement
//! store, the plugin registry and the handshake.
//!
//! Operations are transport-agnostic. They take the relevant header values
//! and body bytes and return either a typed reply or an [`ApiError`] carrying
//! the HTTP status and `{code, message}` body.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use zeroize::Zeroizing;

use sdn_license_auth::{serve_stream, serve_tcp, Authenticator, StreamConfig};
use sdn_license_core::{
    decode_key32, is_known_plan, CapabilityClaims, Clock, Keypair, SystemClock, TokenVerifier,
    DEFAULT_KEY_DECODERS,
};
use sdn_license_keys::{
    build_envelope, EnvelopeTarget, KeysError, PluginDescriptor, PluginKeyEnvelope,
    PluginRegistry, PluginUpload, RuntimeStatus, X25519PublicKey,
};
use sdn_license_store::{
    Entitlement, EntitlementResolver, EntitlementStatus, EntitlementStore, SqliteEntitlementStore,
};

use crate::config::LicenseConfig;
use crate::error::{ApiError, Result};
use crate::keyfile::{load_node_x25519_key, load_or_create_signing_key};

/// Header carrying the caller's libp2p peer id.
pub const PEER_ID_HEADER: &str = "X-SDN-Peer-ID";
pub const ENVELOPE_CACHE_CONTROL: &str = "private, no-store";
pub const ENVELOPE_VARY: &str = "Authorization, X-SDN-Peer-ID";

// ─────────────────────────────────────────────────────────────────────────
// Request and reply bodies
// ─────────────────────────────────────────────────────────────────────────

/// Body of a key-envelope request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyEnvelopeRequest {
    pub client_x25519_pubkey: String,
    #[serde(default)]
    pub bundle_sha256: Option<String>,
}

/// A key envelope plus the response headers that must accompany it.
#[derive(Debug, Clone)]
pub struct EnvelopeReply {
    pub envelope: PluginKeyEnvelope,
    pub headers: Vec<(&'static str, &'static str)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub server_peer_id: String,
    pub issuer: String,
    pub plugins: Vec<PluginDescriptor>,
}

/// Result of a conditional bundle read.
#[derive(Debug, Clone)]
pub enum BundleReply {
    Bundle(sdn_license_keys::BundleBytes),
    NotModified { etag: String },
}

/// Administrative entitlement write. Missing fields keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntitlementUpdate {
    pub xpub: String,
    #[serde(default)]
    pub peer_id: String,
    pub plan: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub expires_at: i64,
}

// ─────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────

pub struct LicenseService {
    config: LicenseConfig,
    store: Arc<dyn EntitlementStore>,
    registry: Arc<PluginRegistry>,
    authenticator: Arc<Authenticator>,
    verifier: TokenVerifier,
    clock: Arc<dyn Clock>,
}

impl LicenseService {
    /// Open the service from disk: signing key, SQLite store and plugin root.
    pub fn open(config: LicenseConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(config.license_dir())?;

        let keypair = load_or_create_signing_key(&config.signing_key_path())?;
        let store: Arc<dyn EntitlementStore> =
            Arc::new(SqliteEntitlementStore::open(config.database_path())?);
        let node_secret = match &config.node_x25519_key_path {
            Some(path) => Some(load_node_x25519_key(path)?),
            None => None,
        };
        let registry = Arc::new(PluginRegistry::open(config.plugin_root(), node_secret)?);

        let service = Self::from_parts(config, keypair, store, registry, Arc::new(SystemClock));
        tracing::info!(
            server_peer_id = %service.server_peer_id(),
            plugins = service.registry.count(),
            "license service opened"
        );
        Ok(service)
    }

    /// Assemble a service from already-opened parts.
    pub fn from_parts(
        config: LicenseConfig,
        keypair: Keypair,
        store: Arc<dyn EntitlementStore>,
        registry: Arc<PluginRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let resolver = Arc::new(store.clone()) as Arc<dyn EntitlementResolver>;
        let authenticator = Arc::new(Authenticator::with_clock(
            Arc::new(keypair),
            resolver,
            config.auth_config(),
            clock.clone(),
        ));
        let verifier = authenticator
            .verifier()
            .with_leeway(config.verify_leeway_secs);
        Self {
            config,
            store,
            registry,
            authenticator,
            verifier,
            clock,
        }
    }

    pub fn config(&self) -> &LicenseConfig {
        &self.config
    }

    pub fn server_peer_id(&self) -> &str {
        self.authenticator.server_peer_id()
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.authenticator
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    // ─────────────────────────────────────────────────────────────────────
    // Handshake streams
    // ─────────────────────────────────────────────────────────────────────

    /// Serve one handshake request on an already-open stream.
    pub async fn handle_stream<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        serve_stream(&self.authenticator, stream, &self.config.stream_config()).await?;
        Ok(())
    }

    /// Accept handshake streams on `listener` until it fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let config: StreamConfig = self.config.stream_config();
        serve_tcp(listener, self.authenticator.clone(), config).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Token verification
    // ─────────────────────────────────────────────────────────────────────

    /// Verify a bearer token. An empty peer header skips the peer binding.
    pub fn verify(
        &self,
        authorization: Option<&str>,
        peer_id: Option<&str>,
        scopes: &[String],
    ) -> std::result::Result<CapabilityClaims, ApiError> {
        let scopes: Vec<String> = scopes
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let claims = self.verifier.verify_authorization_header(
            authorization.unwrap_or_default(),
            peer_id.unwrap_or_default(),
            &scopes,
        )?;
        Ok(claims)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Key envelope
    // ─────────────────────────────────────────────────────────────────────

    /// Wrap a plugin's content key to the caller's X25519 key.
    ///
    /// Checks run in order: plugin lookup (404), body (400), token with the
    /// plugin's scope (401), bundle hash (409).
    pub fn key_envelope(
        &self,
        plugin_id: &str,
        authorization: Option<&str>,
        peer_id: Option<&str>,
        body: &[u8],
    ) -> std::result::Result<EnvelopeReply, ApiError> {
        let asset = self
            .registry
            .get(plugin_id.trim())
            .filter(|a| a.is_encrypted())
            .ok_or_else(|| ApiError::not_found(format!("no encrypted plugin {}", plugin_id)))?;

        let request: KeyEnvelopeRequest = serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request("invalid_json", e.to_string()))?;
        let client_key = request.client_x25519_pubkey.trim();
        if client_key.is_empty() {
            return Err(ApiError::bad_request(
                "invalid_request",
                "missing client_x25519_pubkey",
            ));
        }
        let requester = decode_key32(client_key, DEFAULT_KEY_DECODERS)
            .map(|k| X25519PublicKey::from_bytes(*k))
            .map_err(|_| {
                ApiError::bad_request(
                    "invalid_request",
                    "client_x25519_pubkey must be 32 bytes (hex or base64)",
                )
            })?;

        let required = [asset.required_scope.clone()];
        let claims = self.verify(authorization, peer_id, &required)?;

        if let Some(client_sha) = request.bundle_sha256.as_deref().map(str::trim) {
            if !client_sha.is_empty() && !client_sha.eq_ignore_ascii_case(&asset.bundle_sha256) {
                tracing::warn!(plugin = %asset.id, "key envelope requested for a different bundle");
                return Err(ApiError::conflict(
                    "bundle_mismatch",
                    "bundle_sha256 does not match the served bundle",
                ));
            }
        }

        let content_key = self.registry.read_bundle_key(&asset.id)?;
        let target = EnvelopeTarget {
            plugin_id: &asset.id,
            version: &asset.version,
            required_scope: &asset.required_scope,
            bundle_sha256: &asset.bundle_sha256,
        };
        let envelope = build_envelope(
            &target,
            &content_key,
            &requester,
            &claims,
            self.verifier.issuer(),
            self.clock.now(),
        )
        .map_err(|e| match e {
            KeysError::NonContributory => {
                ApiError::bad_request("invalid_request", "client_x25519_pubkey is a low-order point")
            }
            other => ApiError::from(other),
        })?;

        tracing::info!(
            plugin = %asset.id,
            jti = %claims.jti,
            expires_at = envelope.expires_at,
            "key envelope issued"
        );
        Ok(EnvelopeReply {
            envelope,
            headers: vec![
                ("Cache-Control", ENVELOPE_CACHE_CONTROL),
                ("Vary", ENVELOPE_VARY),
            ],
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────

    pub fn manifest(&self) -> std::result::Result<Manifest, ApiError> {
        Ok(Manifest {
            server_peer_id: self.server_peer_id().to_string(),
            issuer: self.verifier.issuer().to_string(),
            plugins: self.registry.list_public()?,
        })
    }

    /// Served bundle bytes; `if_none_match` equal to the ETag short-circuits.
    pub fn bundle(
        &self,
        plugin_id: &str,
        if_none_match: Option<&str>,
    ) -> std::result::Result<BundleReply, ApiError> {
        let asset = self
            .registry
            .get(plugin_id.trim())
            .ok_or_else(|| ApiError::not_found(format!("no plugin {}", plugin_id)))?;
        let etag = asset.etag();
        if let Some(tags) = if_none_match {
            if tags.split(',').map(str::trim).any(|t| t == etag || t == "*") {
                return Ok(BundleReply::NotModified { etag });
            }
        }
        Ok(BundleReply::Bundle(self.registry.read_bundle(&asset.id)?))
    }

    /// Decrypt an inventory plugin with the node key and record the outcome.
    pub fn activate_plugin(&self, plugin_id: &str) -> std::result::Result<RuntimeStatus, ApiError> {
        let id = plugin_id.trim();
        if self.registry.get(id).is_none() {
            return Err(ApiError::not_found(format!("no plugin {}", id)));
        }
        let status = match self.registry.decrypt_bundle(id) {
            Ok(plaintext) => {
                tracing::info!(plugin = %id, len = plaintext.len(), "plugin activated");
                RuntimeStatus::running()
            }
            Err(e) => {
                tracing::warn!(plugin = %id, code = e.code(), error = %e, "plugin activation failed");
                RuntimeStatus::error(e.to_string())
            }
        };
        self.registry.set_runtime_status(id, status.clone())?;
        Ok(status)
    }

    /// Decrypt a staged artifact from the key server.
    pub fn unwrap_staged(&self, json: &[u8]) -> std::result::Result<Zeroizing<Vec<u8>>, ApiError> {
        Ok(self.registry.unwrap_staged(json)?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────────────

    fn require_admin(&self, presented: Option<&str>) -> std::result::Result<(), ApiError> {
        let expected = self.config.admin_token.trim();
        if expected.is_empty() {
            return Err(ApiError::forbidden("admin_disabled", "admin token not configured"));
        }
        let presented = presented.unwrap_or_default().trim();
        let presented = presented.strip_prefix("Bearer ").unwrap_or(presented).trim();
        let matches: bool = presented.as_bytes().ct_eq(expected.as_bytes()).into();
        if presented.is_empty() || !matches {
            tracing::warn!("admin request with bad token");
            return Err(ApiError::unauthorized("unauthorized", "invalid admin token"));
        }
        Ok(())
    }

    pub async fn admin_get(
        &self,
        admin_token: Option<&str>,
        xpub: &str,
    ) -> std::result::Result<Entitlement, ApiError> {
        self.require_admin(admin_token)?;
        let xpub = xpub.trim();
        if xpub.is_empty() {
            return Err(ApiError::bad_request("invalid_request", "missing xpub"));
        }
        self.store
            .get(xpub)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("no entitlement for {}", xpub)))
    }

    /// Insert or replace an entitlement from a JSON [`EntitlementUpdate`].
    pub async fn admin_upsert(
        &self,
        admin_token: Option<&str>,
        body: &[u8],
    ) -> std::result::Result<Entitlement, ApiError> {
        self.require_admin(admin_token)?;
        let update: EntitlementUpdate = serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request("invalid_json", e.to_string()))?;

        let plan = update.plan.trim().to_ascii_lowercase();
        if !is_known_plan(&plan) {
            return Err(ApiError::bad_request(
                "invalid_plan",
                format!("unknown plan {:?}", update.plan),
            ));
        }
        let status = match update.status.as_deref().map(str::trim) {
            None | Some("") => EntitlementStatus::Active,
            Some(s) => s
                .parse::<EntitlementStatus>()
                .map_err(|e| ApiError::bad_request("invalid_status", e.to_string()))?,
        };

        let written = self
            .store
            .upsert(&Entitlement {
                xpub: update.xpub,
                peer_id: update.peer_id,
                plan,
                status,
                expires_at: update.expires_at,
                updated_at: 0,
            })
            .await?;
        tracing::info!(plan = %written.plan, status = %written.status, "entitlement updated");
        Ok(written)
    }

    /// Store a signed plugin upload and publish it in the catalog.
    pub fn upload(
        &self,
        admin_token: Option<&str>,
        upload: &PluginUpload,
    ) -> std::result::Result<PluginDescriptor, ApiError> {
        self.require_admin(admin_token)?;
        let asset = self.registry.add_plugin(upload, self.clock.now())?;
        self.registry
            .list_public()?
            .into_iter()
            .find(|d| d.id == asset.id)
            .ok_or_else(|| ApiError::internal("uploaded plugin missing from catalog"))
    }
}

impl std::fmt::Debug for LicenseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseService")
            .field("server_peer_id", &self.server_peer_id())
            .field("issuer", &self.verifier.issuer())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdn_license_core::{sign_token, ManualClock};
    use sdn_license_keys::{open_envelope, sign_bundle, X25519StaticSecret};
    use sdn_license_store::MemoryEntitlementStore;

    const NOW: i64 = 1_700_000_000;
    const ADMIN: &str = "admin-secret";

    struct Fixture {
        _dir: tempfile::TempDir,
        service: LicenseService,
        keypair: Keypair,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("vault")).unwrap();
        std::fs::write(root.join("vault/plugin.enc"), b"encrypted-bytes").unwrap();
        std::fs::write(root.join("vault/plugin.key"), hex::encode([7u8; 32])).unwrap();
        std::fs::write(
            root.join("catalog.json"),
            serde_json::json!({"plugins": [{
                "id": "vault",
                "version": "1.0.0",
                "required_scope": "premium",
                "encrypted_path": "vault/plugin.enc",
                "key_path": "vault/plugin.key"
            }]})
            .to_string(),
        )
        .unwrap();

        let clock = Arc::new(ManualClock::new(NOW));
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let config = LicenseConfig {
            admin_token: ADMIN.into(),
            ..LicenseConfig::default()
        };
        let registry = Arc::new(PluginRegistry::open(root, None).unwrap());
        let store: Arc<dyn EntitlementStore> =
            Arc::new(MemoryEntitlementStore::with_clock(clock.clone()));
        let service = LicenseService::from_parts(config, keypair.clone(), store, registry, clock.clone());
        Fixture {
            _dir: dir,
            service,
            keypair,
            clock,
        }
    }

    fn token(keypair: &Keypair, plan: &str, scopes: &[&str], exp: i64) -> String {
        let claims = CapabilityClaims {
            iss: "sdn-license".into(),
            sub: "xpub-test".into(),
            peer_id: "12D3KooWPeer".into(),
            plan: plan.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            iat: NOW,
            exp,
            jti: "jti-1".into(),
        };
        format!("Bearer {}", sign_token(&claims, keypair).unwrap())
    }

    fn body(pubkey: &X25519PublicKey, sha: Option<&str>) -> Vec<u8> {
        let mut value = serde_json::json!({"client_x25519_pubkey": hex::encode(pubkey.as_bytes())});
        if let Some(sha) = sha {
            value["bundle_sha256"] = sha.into();
        }
        value.to_string().into_bytes()
    }

    #[test]
    fn test_verify_reports_token_code() {
        let f = fixture();
        let auth = token(&f.keypair, "free", &["read:free", "base"], NOW + 600);

        let claims = f.service.verify(Some(auth.as_str()), Some("12D3KooWPeer"), &[]).unwrap();
        assert_eq!(claims.sub, "xpub-test");

        let err = f.service.verify(None, None, &[]).unwrap_err();
        assert_eq!((err.status, err.code.as_str()), (401, "missing_authorization"));

        let err = f
            .service
            .verify(Some(auth.as_str()), None, &["premium".to_string()])
            .unwrap_err();
        assert_eq!(err.code, "token_missing_scope");

        let err = f.service.verify(Some(auth.as_str()), Some("12D3KooWOther"), &[]).unwrap_err();
        assert_eq!(err.code, "token_peer_id_mismatch");
    }

    #[test]
    fn test_key_envelope_opens_to_content_key() {
        let f = fixture();
        let requester = X25519StaticSecret::generate();
        let auth = token(&f.keypair, "pro", &["base", "premium"], NOW + 600);
        let sha = f.service.registry().get("vault").unwrap().bundle_sha256;

        let reply = f
            .service
            .key_envelope(
                "vault",
                Some(auth.as_str()),
                Some("12D3KooWPeer"),
                &body(&requester.public_key(), Some(sha.to_uppercase().as_str())),
            )
            .unwrap();
        assert!(reply.headers.contains(&("Cache-Control", "private, no-store")));
        assert!(reply.headers.contains(&("Vary", "Authorization, X-SDN-Peer-ID")));
        assert_eq!(reply.envelope.bundle_sha256, sha);
        assert_eq!(reply.envelope.expires_at, NOW + 120);

        let key = open_envelope(&reply.envelope, &requester, NOW).unwrap();
        assert_eq!(*key, [7u8; 32]);
    }

    #[test]
    fn test_key_envelope_check_order() {
        let f = fixture();
        let requester = X25519StaticSecret::generate().public_key();
        let good = token(&f.keypair, "pro", &["base", "premium"], NOW + 600);
        let free = token(&f.keypair, "free", &["read:free", "base"], NOW + 600);

        let err = f.service.key_envelope("missing", None, None, b"{").unwrap_err();
        assert_eq!(err.status, 404);

        let err = f.service.key_envelope("vault", None, None, b"{").unwrap_err();
        assert_eq!((err.status, err.code.as_str()), (400, "invalid_json"));

        let err = f
            .service
            .key_envelope("vault", None, None, br#"{"client_x25519_pubkey":"aa","extra":1}"#)
            .unwrap_err();
        assert_eq!(err.code, "invalid_json");

        let err = f
            .service
            .key_envelope("vault", None, None, br#"{"client_x25519_pubkey":"zz"}"#)
            .unwrap_err();
        assert_eq!((err.status, err.code.as_str()), (400, "invalid_request"));

        let err = f
            .service
            .key_envelope("vault", Some(free.as_str()), None, &body(&requester, Some("00")))
            .unwrap_err();
        assert_eq!((err.status, err.code.as_str()), (401, "token_missing_scope"));

        let err = f
            .service
            .key_envelope("vault", Some(good.as_str()), None, &body(&requester, Some("00")))
            .unwrap_err();
        assert_eq!((err.status, err.code.as_str()), (409, "bundle_mismatch"));
    }

    #[test]
    fn test_key_envelope_rejects_low_order_key() {
        let f = fixture();
        let auth = token(&f.keypair, "pro", &["premium"], NOW + 600);
        let zero = X25519PublicKey::from_bytes([0u8; 32]);
        let err = f
            .service
            .key_envelope("vault", Some(auth.as_str()), None, &body(&zero, None))
            .unwrap_err();
        assert_eq!((err.status, err.code.as_str()), (400, "invalid_request"));
    }

    #[test]
    fn test_expired_token_gets_no_envelope() {
        let f = fixture();
        let auth = token(&f.keypair, "pro", &["premium"], NOW + 10);
        f.clock.advance(100);
        let requester = X25519StaticSecret::generate().public_key();
        let err = f
            .service
            .key_envelope("vault", Some(auth.as_str()), None, &body(&requester, None))
            .unwrap_err();
        assert_eq!(err.code, "token_expired");
    }

    #[test]
    fn test_manifest_and_conditional_bundle() {
        let f = fixture();
        let manifest = f.service.manifest().unwrap();
        assert_eq!(manifest.server_peer_id, f.keypair.peer_id());
        assert_eq!(manifest.plugins.len(), 1);
        assert!(!serde_json::to_string(&manifest).unwrap().contains("plugin.key"));

        let etag = match f.service.bundle("vault", None).unwrap() {
            BundleReply::Bundle(b) => {
                assert_eq!(&b.data[..], b"encrypted-bytes");
                b.etag
            }
            other => panic!("unexpected: {:?}", other),
        };
        assert!(matches!(
            f.service.bundle("vault", Some(etag.as_str())).unwrap(),
            BundleReply::NotModified { .. }
        ));
        assert_eq!(f.service.bundle("nope", None).unwrap_err().status, 404);
    }

    #[test]
    fn test_activation_without_node_key_records_error() {
        let f = fixture();
        let status = f.service.activate_plugin("vault").unwrap();
        assert_eq!(status.state, sdn_license_keys::RuntimeState::Error);
        assert_eq!(f.service.manifest().unwrap().plugins[0].runtime, status);
    }

    #[tokio::test]
    async fn test_admin_token_required() {
        let f = fixture();
        let body = br#"{"xpub":"xpub-paid","plan":"pro"}"#;

        assert_eq!(f.service.admin_upsert(None, body).await.unwrap_err().status, 401);
        assert_eq!(
            f.service.admin_upsert(Some("wrong"), body).await.unwrap_err().status,
            401
        );

        let written = f
            .service
            .admin_upsert(Some("Bearer admin-secret"), body)
            .await
            .unwrap();
        assert_eq!(written.plan, "pro");
        assert_eq!(written.status, EntitlementStatus::Active);

        let read = f.service.admin_get(Some(ADMIN), "xpub-paid").await.unwrap();
        assert_eq!(read, written);
        assert_eq!(
            f.service.admin_get(Some(ADMIN), "xpub-none").await.unwrap_err().status,
            404
        );
    }

    #[tokio::test]
    async fn test_admin_validation() {
        let f = fixture();
        let err = f
            .service
            .admin_upsert(Some(ADMIN), br#"{"xpub":"x","plan":"platinum"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.code, "invalid_plan");

        let err = f
            .service
            .admin_upsert(Some(ADMIN), br#"{"xpub":"x","plan":"pro","status":"paused"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.code, "invalid_status");

        let err = f
            .service
            .admin_upsert(Some(ADMIN), br#"{"xpub":" ","plan":"pro"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn test_admin_disabled_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let service = LicenseService::from_parts(
            LicenseConfig::default(),
            Keypair::generate(),
            Arc::new(MemoryEntitlementStore::new()),
            Arc::new(PluginRegistry::open(dir.path(), None).unwrap()),
            Arc::new(SystemClock),
        );
        let err = service.admin_get(Some(""), "xpub").await.unwrap_err();
        assert_eq!((err.status, err.code.as_str()), (403, "admin_disabled"));
    }

    #[test]
    fn test_signed_upload() {
        let f = fixture();
        let signer = Keypair::generate();
        let bundle = b"\0asm plugin".to_vec();
        let upload = PluginUpload {
            id: "tools".into(),
            version: "0.2.0".into(),
            required_scope: String::new(),
            content_type: None,
            signature_hex: sign_bundle(&bundle, &signer),
            signer_pubkey_hex: signer.public_key().to_hex(),
            bundle: bundle.into(),
        };

        assert_eq!(f.service.upload(None, &upload).unwrap_err().status, 401);
        let descriptor = f.service.upload(Some(ADMIN), &upload).unwrap();
        assert_eq!(descriptor.required_scope, "base");
        assert_eq!(descriptor.uploaded_at, Some(NOW));
        assert_eq!(f.service.manifest().unwrap().plugins.len(), 2);

        let tampered = PluginUpload {
            bundle: b"other".to_vec().into(),
            ..upload
        };
        assert_eq!(f.service.upload(Some(ADMIN), &tampered).unwrap_err().code, "invalid_signature");
    }
}
