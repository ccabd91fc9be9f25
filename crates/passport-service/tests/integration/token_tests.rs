//! Token issuance integration tests.
//!
//! Emission runs against a wiremock server publishing the recipient's key
//! set, fetched through the real HTTP key-set source.

use passport_service::keys::derive_kid;
use passport_service::services::recipient_keys::HttpKeySetSource;
use passport_test_utils::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn recipient_server() -> Result<MockServer, anyhow::Error> {
    let recipient = rsa_private_key(RsaFixture::B2048)?;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [
                {"kty": "EC", "kid": "partner-a-sig-1", "crv": "P-256"},
                recipient_jwk(&recipient, RECIPIENT_KID),
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Ok(server)
}

async fn spawn_with_recipient(
    recipient: &MockServer,
) -> Result<TestPassportServer, anyhow::Error> {
    let key_sets = HttpKeySetSource::new(Duration::from_secs(2))?;
    TestPassportServer::spawn(
        utc(2025, 3, 1),
        &format!("{}/jwks.json", recipient.uri()),
        Arc::new(key_sets),
    )
    .await
}

async fn post(url: String, body: Value) -> Result<(u16, Value), anyhow::Error> {
    let response = reqwest::Client::new().post(url).json(&body).send().await?;
    let status = response.status().as_u16();
    Ok((status, response.json().await?))
}

#[tokio::test]
async fn test_issue_token_merges_base_claims() -> Result<(), anyhow::Error> {
    let server = TestPassportServer::spawn(
        utc(2025, 3, 1),
        "http://127.0.0.1:1/jwks.json",
        Arc::new(CountingKeySetSource::new()),
    )
    .await?;

    let (status, body) = post(
        format!("{}/api/v1/tokens", server.url()),
        json!({"claims": {"sub": "alice", "scope": "read"}}),
    )
    .await?;
    assert_eq!(status, 200);

    let token = body["token"].as_str().unwrap().to_string();
    token
        .assert_valid_jws()
        .assert_header("alg", "ES256")
        .assert_header("kid", &derive_kid(JWT_KEY_2025))
        .assert_claim("iss", TEST_ISSUER)
        .assert_claim("sub", "alice")
        .assert_claim("scope", "read")
        .assert_lifetime(300);

    let claims = token_claims(&token);
    assert_eq!(claims["iat"], utc(2025, 3, 1).timestamp());
    assert_eq!(claims["nbf"], utc(2025, 3, 1).timestamp() - 30);
    assert!(claims["jti"].is_string());

    Ok(())
}

#[tokio::test]
async fn test_issue_token_without_claims_field() -> Result<(), anyhow::Error> {
    let server = TestPassportServer::spawn(
        utc(2025, 3, 1),
        "http://127.0.0.1:1/jwks.json",
        Arc::new(CountingKeySetSource::new()),
    )
    .await?;

    let (status, body) = post(format!("{}/api/v1/tokens", server.url()), json!({})).await?;
    assert_eq!(status, 200);
    body["token"]
        .as_str()
        .unwrap()
        .assert_valid_jws()
        .assert_claim("iss", TEST_ISSUER);

    Ok(())
}

#[tokio::test]
async fn test_issue_token_rejects_malformed_body() -> Result<(), anyhow::Error> {
    let server = TestPassportServer::spawn(
        utc(2025, 3, 1),
        "http://127.0.0.1:1/jwks.json",
        Arc::new(CountingKeySetSource::new()),
    )
    .await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/tokens", server.url()))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");

    Ok(())
}

#[tokio::test]
async fn test_emit_token_encrypts_for_recipient() -> Result<(), anyhow::Error> {
    let recipient = recipient_server().await?;
    let server = spawn_with_recipient(&recipient).await?;

    let (status, body) = post(
        format!("{}/api/v1/destinations/{}/tokens", server.url(), DESTINATION_REF),
        json!({"claims": {"sub": "alice", "aud": "https://attacker.example"}}),
    )
    .await?;
    assert_eq!(status, 200);

    let jwe = body["token"].as_str().unwrap().to_string();
    jwe.assert_valid_jwe()
        .assert_header("kid", RECIPIENT_KID)
        .assert_header("cty", "JWT");

    let recipient_key = rsa_private_key(RsaFixture::B2048)?;
    let inner = String::from_utf8(decrypt_jwe(&recipient_key, &jwe)?)?;
    inner
        .assert_valid_jws()
        .assert_header("kid", &derive_kid(JWT_KEY_2025))
        .assert_claim("aud", DESTINATION_AUDIENCE)
        .assert_claim("sub", "alice");

    Ok(())
}

#[tokio::test]
async fn test_emit_token_uses_key_wrap_published_by_recipient() -> Result<(), anyhow::Error> {
    let recipient_key = rsa_private_key(RsaFixture::B2048)?;
    let mut jwk = recipient_jwk(&recipient_key, RECIPIENT_KID);
    jwk["alg"] = json!("RSA-OAEP");

    let recipient = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": [jwk]})))
        .mount(&recipient)
        .await;
    let server = spawn_with_recipient(&recipient).await?;

    let (status, body) = post(
        format!("{}/api/v1/destinations/{}/tokens", server.url(), DESTINATION_REF),
        json!({"claims": {"sub": "carol"}}),
    )
    .await?;
    assert_eq!(status, 200);

    let jwe = body["token"].as_str().unwrap().to_string();
    jwe.assert_valid_jwe().assert_header("alg", "RSA-OAEP");

    let inner = String::from_utf8(decrypt_jwe(&recipient_key, &jwe)?)?;
    inner.assert_valid_jws().assert_claim("sub", "carol");

    Ok(())
}

#[tokio::test]
async fn test_emit_token_fetches_key_set_once() -> Result<(), anyhow::Error> {
    let recipient = recipient_server().await?;
    let server = spawn_with_recipient(&recipient).await?;
    let url = format!("{}/api/v1/destinations/{}/tokens", server.url(), DESTINATION_REF);

    for _ in 0..3 {
        let (status, _) = post(url.clone(), json!({"claims": {}})).await?;
        assert_eq!(status, 200);
    }

    // expect(1) on the mock is verified on drop
    recipient.verify().await;
    Ok(())
}

#[tokio::test]
async fn test_emit_token_unknown_destination_returns_404() -> Result<(), anyhow::Error> {
    let server = TestPassportServer::spawn(
        utc(2025, 3, 1),
        "http://127.0.0.1:1/jwks.json",
        Arc::new(CountingKeySetSource::new()),
    )
    .await?;

    let (status, body) = post(
        format!("{}/api/v1/destinations/nobody/tokens", server.url()),
        json!({"claims": {}}),
    )
    .await?;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "DESTINATION_NOT_FOUND");

    Ok(())
}

#[tokio::test]
async fn test_emit_token_recipient_outage_returns_502() -> Result<(), anyhow::Error> {
    let recipient = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&recipient)
        .await;
    let server = spawn_with_recipient(&recipient).await?;

    let (status, body) = post(
        format!("{}/api/v1/destinations/{}/tokens", server.url(), DESTINATION_REF),
        json!({"claims": {}}),
    )
    .await?;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "RECIPIENT_KEY_UNAVAILABLE");

    Ok(())
}

#[tokio::test]
async fn test_custodian_outage_during_signing_returns_502() -> Result<(), anyhow::Error> {
    let server = TestPassportServer::spawn(
        utc(2025, 3, 1),
        "http://127.0.0.1:1/jwks.json",
        Arc::new(CountingKeySetSource::new()),
    )
    .await?;
    server.custodian().set_failing(true);

    let (status, body) = post(
        format!("{}/api/v1/tokens", server.url()),
        json!({"claims": {"sub": "alice"}}),
    )
    .await?;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "SIGNING_FAILED");

    Ok(())
}
