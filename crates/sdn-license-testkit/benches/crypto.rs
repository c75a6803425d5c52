use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sdn_license_core::{sign_token, verify_token, VerifyOptions};
use sdn_license_keys::{build_envelope, decrypt_bundle, open_envelope, EnvelopeTarget, X25519StaticSecret};
use sdn_license_testkit::vectors::{bundle_vectors, node_x25519_secret, token_vector};

fn bench_tokens(c: &mut Criterion) {
    let v = token_vector();
    let node = v.node_keypair();
    let claims = v.claims();
    let opts = VerifyOptions {
        now: claims.iat,
        leeway: 30,
        issuer: claims.iss.clone(),
        expected_peer_id: claims.peer_id.clone(),
        required_scopes: vec!["base".into()],
    };

    c.bench_function("token_sign", |b| b.iter(|| sign_token(black_box(&claims), &node)));
    c.bench_function("token_verify", |b| {
        b.iter(|| verify_token(black_box(v.expected_token), &node.public_key(), &opts))
    });
}

fn bench_envelope(c: &mut Criterion) {
    let v = token_vector();
    let claims = v.claims();
    let requester = X25519StaticSecret::generate();
    let target = EnvelopeTarget {
        plugin_id: "bench",
        version: "1",
        required_scope: "base",
        bundle_sha256: "00",
    };
    let envelope = build_envelope(&target, &[9u8; 32], &requester.public_key(), &claims, "sdn-license", claims.iat)
        .expect("envelope");

    c.bench_function("envelope_build", |b| {
        b.iter(|| build_envelope(&target, &[9u8; 32], &requester.public_key(), &claims, "sdn-license", claims.iat))
    });
    c.bench_function("envelope_open", |b| {
        b.iter(|| open_envelope(black_box(&envelope), &requester, claims.iat))
    });
}

fn bench_bundles(c: &mut Criterion) {
    let node = node_x25519_secret();
    for v in bundle_vectors() {
        let bundle = v.bundle();
        c.bench_function(&format!("bundle_decrypt_v{}", v.version), |b| {
            b.iter(|| decrypt_bundle(black_box(&bundle), Some(&node)))
        });
    }
}

criterion_group!(benches, bench_tokens, bench_envelope, bench_bundles);
criterion_main!(benches);
