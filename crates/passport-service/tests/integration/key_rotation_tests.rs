//! Key rotation integration tests.
//!
//! Rotation is purely clock-driven: the same running server switches
//! signing keys when `use_from` passes.

use passport_service::errors::PassportError;
use passport_service::keys::{derive_kid, KeyGroup};
use passport_test_utils::*;
use serde_json::Map;
use std::sync::Arc;

async fn server_at(now: chrono::DateTime<chrono::Utc>) -> Result<TestPassportServer, anyhow::Error> {
    TestPassportServer::spawn(
        now,
        "http://127.0.0.1:1/jwks.json",
        Arc::new(CountingKeySetSource::new()),
    )
    .await
}

#[tokio::test]
async fn test_signer_switches_at_use_from() -> Result<(), anyhow::Error> {
    let server = server_at(utc(2024, 12, 31)).await?;
    let issuer = &server.state().issuer;

    let token = issuer.sign(Map::new()).await?;
    token
        .assert_header("alg", "PS256")
        .assert_header("kid", &derive_kid(JWT_KEY_2024));

    server.clock().set(utc(2025, 1, 1));
    let token = issuer.sign(Map::new()).await?;
    token
        .assert_header("alg", "ES256")
        .assert_header("kid", &derive_kid(JWT_KEY_2025));

    Ok(())
}

#[tokio::test]
async fn test_keys_load_once_at_startup() -> Result<(), anyhow::Error> {
    let server = server_at(utc(2025, 3, 1)).await?;
    assert_eq!(server.custodian().public_key_calls(), 4);

    for day in 1..=3 {
        server.clock().set(utc(2025, 3, day));
        server.state().issuer.sign(Map::new()).await?;
    }

    assert_eq!(server.custodian().public_key_calls(), 4);
    assert_eq!(server.custodian().sign_calls(), 3);

    Ok(())
}

#[tokio::test]
async fn test_no_signer_before_first_use_from() -> Result<(), anyhow::Error> {
    let server = server_at(utc(2023, 12, 31)).await?;

    let err = server.state().issuer.sign(Map::new()).await.unwrap_err();
    assert!(matches!(
        err,
        PassportError::NoActiveKey {
            group: KeyGroup::Jwt
        }
    ));

    // Future keys are already visible for pre-publication
    assert_eq!(server.state().store.visible_signing_keys().len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_public_key_pem_matches_publication_key() -> Result<(), anyhow::Error> {
    let server = server_at(utc(2025, 3, 1)).await?;

    let pem = reqwest::get(format!("{}/public-key", server.url()))
        .await?
        .text()
        .await?;

    assert_eq!(pem, server.state().store.publication_public_key_pem()?);
    assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

    Ok(())
}
