//! Published key set integration tests.
//!
//! The key set is fetched over HTTP, authenticated with the publication
//! public key, and then used to verify issued tokens.

use jsonwebtoken::Algorithm;
use passport_service::keys::derive_kid;
use passport_test_utils::*;
use serde_json::{json, Value};
use std::sync::Arc;

async fn server_at(now: chrono::DateTime<chrono::Utc>) -> Result<TestPassportServer, anyhow::Error> {
    TestPassportServer::spawn(
        now,
        "http://127.0.0.1:1/jwks.json",
        Arc::new(CountingKeySetSource::new()),
    )
    .await
}

/// Fetches the envelope and verifies it against `/public-key`.
async fn fetch_verified_jwks(server: &TestPassportServer) -> Result<Vec<Value>, anyhow::Error> {
    let client = reqwest::Client::new();

    let pem = client
        .get(format!("{}/public-key", server.url()))
        .send()
        .await?
        .text()
        .await?;

    let response = client
        .get(format!("{}/.well-known/jwks", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/jwt")
    );

    let envelope = response.text().await?;
    envelope
        .assert_valid_jws()
        .assert_header("alg", "ES384")
        .assert_header("kid", &derive_kid(JWKS_KEY_2024))
        .assert_claim("iss", TEST_ISSUER);

    let claims = verify_with_pem(&envelope, Algorithm::ES384, &pem);
    let keys = claims["jwks"]["keys"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    Ok(keys)
}

fn kids(keys: &[Value]) -> Vec<String> {
    keys.iter()
        .filter_map(|k| k["kid"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_key_set_lists_enc_then_visible_signing_keys() -> Result<(), anyhow::Error> {
    let server = server_at(utc(2025, 3, 1)).await?;
    let keys = fetch_verified_jwks(&server).await?;

    assert_eq!(
        kids(&keys),
        vec![
            derive_kid(JOSE_KEY_2024),
            derive_kid(JWT_KEY_2024),
            derive_kid(JWT_KEY_2025),
        ]
    );

    let enc = &keys[0];
    assert_eq!(enc["use"], "enc");
    assert_eq!(enc["kty"], "RSA");
    assert_eq!(enc["alg"], "RS256");
    assert_eq!(enc["e"], "AQAB");

    let rsa_sig = &keys[1];
    assert_eq!(rsa_sig["use"], "sig");
    assert_eq!(rsa_sig["kty"], "RSA");

    let ec_sig = &keys[2];
    assert_eq!(ec_sig["kty"], "EC");
    assert_eq!(ec_sig["crv"], "P-256");
    assert_eq!(ec_sig["alg"], "ES256");
    assert!(ec_sig.get("n").is_none());
    assert_eq!(ec_sig["x5c"].as_array().map(Vec::len), Some(1));

    Ok(())
}

#[tokio::test]
async fn test_retired_key_drops_out_after_overlap() -> Result<(), anyhow::Error> {
    let server = server_at(utc(2025, 3, 1)).await?;
    assert_eq!(fetch_verified_jwks(&server).await?.len(), 3);

    server.clock().set(utc(2025, 7, 1));
    let keys = fetch_verified_jwks(&server).await?;

    assert_eq!(
        kids(&keys),
        vec![derive_kid(JOSE_KEY_2024), derive_kid(JWT_KEY_2025)]
    );

    Ok(())
}

#[tokio::test]
async fn test_issued_tokens_verify_against_published_keys() -> Result<(), anyhow::Error> {
    let client = reqwest::Client::new();

    // RSA signer
    let server = server_at(utc(2024, 6, 1)).await?;
    let keys = fetch_verified_jwks(&server).await?;
    let body: Value = client
        .post(format!("{}/api/v1/tokens", server.url()))
        .json(&json!({"claims": {"sub": "alice"}}))
        .send()
        .await?
        .json()
        .await?;
    let token = body["token"].as_str().unwrap_or_default().to_string();
    token
        .assert_valid_jws()
        .assert_header("alg", "PS256")
        .assert_header("kid", &derive_kid(JWT_KEY_2024));

    let jwk = keys
        .iter()
        .find(|k| k["kid"] == derive_kid(JWT_KEY_2024))
        .cloned()
        .unwrap_or_default();
    let claims = verify_with_jwk(&token, Algorithm::PS256, &jwk);
    assert_eq!(claims["sub"], "alice");

    // EC signer after rotation
    server.clock().set(utc(2025, 3, 1));
    let keys = fetch_verified_jwks(&server).await?;
    let body: Value = client
        .post(format!("{}/api/v1/tokens", server.url()))
        .json(&json!({"claims": {"sub": "bob"}}))
        .send()
        .await?
        .json()
        .await?;
    let token = body["token"].as_str().unwrap_or_default().to_string();
    token.assert_header("alg", "ES256");

    let jwk = keys
        .iter()
        .find(|k| k["kid"] == derive_kid(JWT_KEY_2025))
        .cloned()
        .unwrap_or_default();
    let claims = verify_with_jwk(&token, Algorithm::ES256, &jwk);
    assert_eq!(claims["sub"], "bob");

    Ok(())
}

#[tokio::test]
async fn test_key_set_unavailable_before_publication_key_is_active() -> Result<(), anyhow::Error> {
    let server = server_at(utc(2023, 6, 1)).await?;

    let response = reqwest::get(format!("{}/.well-known/jwks", server.url())).await?;
    assert_eq!(response.status(), 503);

    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "NO_ACTIVE_KEY");

    Ok(())
}

#[tokio::test]
async fn test_issuer_config_maps_kids_to_custodian_keys() -> Result<(), anyhow::Error> {
    let server = server_at(utc(2025, 3, 1)).await?;
    let url = format!("{}/internal/issuer-config", server.url());

    let response = reqwest::get(&url).await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;

    assert_eq!(
        body,
        json!({
            "issuer": TEST_ISSUER,
            "signing_keys": {
                derive_kid(JWT_KEY_2024): JWT_KEY_2024,
                derive_kid(JWT_KEY_2025): JWT_KEY_2025,
            },
            "decryption_keys": {
                derive_kid(JWKS_KEY_2024): JWKS_KEY_2024,
            },
        })
    );

    server.clock().set(utc(2025, 7, 1));
    let body: Value = reqwest::get(&url).await?.json().await?;
    assert!(body["signing_keys"].get(derive_kid(JWT_KEY_2024)).is_none());
    assert_eq!(body["signing_keys"][derive_kid(JWT_KEY_2025)], JWT_KEY_2025);

    Ok(())
}
