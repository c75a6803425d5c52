//! Handshake, verification and key delivery through the public service API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use sdn_license::auth::{read_line, write_line, ChallengeRequest, ProofRequest};
use sdn_license::core::{Clock, ManualClock};
use sdn_license::keys::{encrypt_bundle_v2, PluginRegistry};
use sdn_license::store::{EntitlementStore, MemoryEntitlementStore};
use sdn_license::{
    open_envelope, Keypair, LicenseConfig, LicenseService, Request, Response, X25519StaticSecret,
};

const NOW: i64 = 1_750_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct Node {
    _dir: tempfile::TempDir,
    service: Arc<LicenseService>,
    store: Arc<MemoryEntitlementStore>,
    clock: Arc<ManualClock>,
}

/// A node with one premium plugin encrypted to its own inventory key.
fn node() -> Result<Node> {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("plugins");
    std::fs::create_dir_all(root.join("orbits"))?;

    let node_key = X25519StaticSecret::generate();
    let bundle = encrypt_bundle_v2(b"\0asm orbit propagator", &node_key.public_key())?;
    std::fs::write(root.join("orbits/bundle.enc"), bundle)?;
    std::fs::write(root.join("orbits/bundle.key"), hex::encode([0x5au8; 32]))?;
    std::fs::write(
        root.join("catalog.json"),
        serde_json::json!({"plugins": [{
            "id": "orbits",
            "version": "2.1.0",
            "required_scope": "premium",
            "encrypted_path": "orbits/bundle.enc",
            "key_path": "orbits/bundle.key"
        }]})
        .to_string(),
    )?;

    let clock = Arc::new(ManualClock::new(NOW));
    let store = Arc::new(MemoryEntitlementStore::with_clock(clock.clone()));
    let config = LicenseConfig {
        data_dir: dir.path().to_path_buf(),
        ..LicenseConfig::default()
    };
    let registry = Arc::new(PluginRegistry::open(&root, Some(node_key))?);
    let service = LicenseService::from_parts(
        config,
        Keypair::generate(),
        store.clone(),
        registry,
        clock.clone(),
    );
    Ok(Node {
        _dir: dir,
        service: Arc::new(service),
        store,
        clock,
    })
}

/// Send one request over an in-memory stream.
async fn exchange(service: &Arc<LicenseService>, request: &Request) -> Result<Response> {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let service = service.clone();
    let task = tokio::spawn(async move { service.handle_stream(server).await });

    write_line(&mut client, request).await?;
    let line = read_line(&mut client, 1 << 20, Duration::from_secs(5)).await?;
    task.await??;
    Ok(serde_json::from_slice(&line)?)
}

/// Run the full handshake for `client` and return the capability token.
async fn handshake(node: &Node, client: &Keypair, xpub: &str, req_id: &str) -> Result<String> {
    let now = node.clock.now();
    let challenge = match exchange(
        &node.service,
        &Request::ChallengeRequest(ChallengeRequest {
            req_id: req_id.into(),
            xpub: xpub.into(),
            peer_id: client.peer_id(),
            client_pubkey_hex: client.public_key().to_hex(),
            ts: now,
        }),
    )
    .await?
    {
        Response::ChallengeResponse(c) => c,
        other => bail!("expected challenge, got {:?}", other),
    };
    assert_eq!(challenge.server_peer_id, node.service.server_peer_id());
    assert_eq!(challenge.expires_at, now + 60);

    let raw = STANDARD_NO_PAD.decode(&challenge.challenge)?;
    let proof = Request::ProofRequest(ProofRequest {
        req_id: req_id.into(),
        xpub: xpub.into(),
        peer_id: client.peer_id(),
        challenge: challenge.challenge.clone(),
        signature_hex: client.sign(&raw).to_hex(),
        ts: now,
    });
    match exchange(&node.service, &proof).await? {
        Response::GrantResponse(g) => Ok(g.capability_token),
        other => bail!("expected grant, got {:?}", other),
    }
}

#[tokio::test]
async fn test_handshake_then_verify() -> Result<()> {
    init_tracing();
    let node = node()?;
    let client = Keypair::generate();

    let token = handshake(&node, &client, "xpub-test", "r1").await?;
    let auth = format!("Bearer {}", token);
    let claims = node
        .service
        .verify(Some(auth.as_str()), Some(client.peer_id().as_str()), &[])?;

    assert_eq!(claims.sub, "xpub-test");
    assert_eq!(claims.peer_id, client.peer_id());
    assert_eq!(claims.plan, "free");
    assert!(claims.has_scope("read:free"));
    assert!(claims.has_scope("base"));

    let err = node
        .service
        .verify(Some(auth.as_str()), None, &["premium".to_string()])
        .unwrap_err();
    assert_eq!(err.code, "token_missing_scope");
    Ok(())
}

#[tokio::test]
async fn test_replayed_proof_is_rejected() -> Result<()> {
    init_tracing();
    let node = node()?;
    let client = Keypair::generate();
    handshake(&node, &client, "xpub-test", "r1").await?;

    let replay = Request::ProofRequest(ProofRequest {
        req_id: "r1".into(),
        xpub: "xpub-test".into(),
        peer_id: client.peer_id(),
        challenge: STANDARD_NO_PAD.encode([0u8; 32]),
        signature_hex: client.sign(&[0u8; 32]).to_hex(),
        ts: node.clock.now(),
    });
    match exchange(&node.service, &replay).await? {
        Response::ErrorResponse(e) => assert_eq!(e.code, "challenge_not_found"),
        other => bail!("expected error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_paid_plan_receives_plugin_key() -> Result<()> {
    init_tracing();
    let node = node()?;
    let client = Keypair::generate();
    node.store
        .upsert(&sdn_license::Entitlement {
            xpub: "xpub-paid".into(),
            peer_id: client.peer_id(),
            plan: "pro".into(),
            status: sdn_license::EntitlementStatus::Active,
            expires_at: 0,
            updated_at: 0,
        })
        .await?;

    let token = handshake(&node, &client, "xpub-paid", "r2").await?;
    let auth = format!("Bearer {}", token);
    let requester = X25519StaticSecret::generate();
    let body = serde_json::json!({
        "client_x25519_pubkey": STANDARD_NO_PAD.encode(requester.public_key().as_bytes()),
    })
    .to_string();

    let reply = node.service.key_envelope(
        "orbits",
        Some(auth.as_str()),
        Some(client.peer_id().as_str()),
        body.as_bytes(),
    )?;
    assert_eq!(reply.envelope.sub, "xpub-paid");
    let key = open_envelope(&reply.envelope, &requester, node.clock.now())?;
    assert_eq!(*key, [0x5au8; 32]);

    node.clock.advance(121);
    assert!(open_envelope(&reply.envelope, &requester, node.clock.now()).is_err());
    Ok(())
}

#[tokio::test]
async fn test_free_plan_is_refused_premium_plugin() -> Result<()> {
    init_tracing();
    let node = node()?;
    let client = Keypair::generate();
    let token = handshake(&node, &client, "xpub-free", "r3").await?;
    let auth = format!("Bearer {}", token);
    let body = serde_json::json!({
        "client_x25519_pubkey": hex::encode(X25519StaticSecret::generate().public_key().as_bytes()),
    })
    .to_string();

    let err = node
        .service
        .key_envelope("orbits", Some(auth.as_str()), None, body.as_bytes())
        .unwrap_err();
    assert_eq!((err.status, err.code.as_str()), (401, "token_missing_scope"));
    Ok(())
}

#[tokio::test]
async fn test_inventory_bundle_activates() -> Result<()> {
    init_tracing();
    let node = node()?;
    let status = node.service.activate_plugin("orbits")?;
    assert_eq!(status.state, sdn_license::keys::RuntimeState::Running);

    let manifest = node.service.manifest()?;
    assert_eq!(manifest.plugins[0].runtime, status);
    assert!(manifest.plugins[0].encrypted);
    Ok(())
}

#[tokio::test]
async fn test_open_creates_signing_key() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = LicenseConfig {
        data_dir: dir.path().to_path_buf(),
        ..LicenseConfig::default()
    };

    let first = LicenseService::open(config.clone())?;
    let peer = first.server_peer_id().to_string();
    drop(first);

    let second = LicenseService::open(config.clone())?;
    assert_eq!(second.server_peer_id(), peer);
    assert!(config.signing_key_path().exists());
    assert!(second.manifest()?.plugins.is_empty());
    Ok(())
}
