//! Destination and recipient key caching through the token issuer.
//!
//! Services are wired by hand here so the tests can count lookups on
//! each collaborator.

use chrono::Duration;
use passport_service::crypto::jwe::JweEncryptor;
use passport_service::errors::PassportError;
use passport_service::keys::KeyGroupStore;
use passport_service::services::destination::{
    CachingDestinationResolver, Destination, DestinationResolver,
};
use passport_service::services::recipient_keys::RecipientKeyCache;
use passport_service::services::token_issuer::{Claims, ClaimsBuilder, TokenIssuer};
use passport_test_utils::*;
use std::sync::Arc;

const KEY_SET_URL: &str = "https://partner-a.example/.well-known/jwks.json";

fn destination() -> Destination {
    Destination {
        audience: DESTINATION_AUDIENCE.to_string(),
        recipient_key_id: RECIPIENT_KID.to_string(),
        recipient_key_set_url: KEY_SET_URL.to_string(),
    }
}

struct Harness {
    clock: Arc<common::clock::FixedClock>,
    destinations: Arc<CountingDestinationSource>,
    key_sets: Arc<CountingKeySetSource>,
    resolver: Arc<CachingDestinationResolver>,
    issuer: TokenIssuer,
}

async fn harness(destinations: CountingDestinationSource) -> Result<Harness, anyhow::Error> {
    let clock = Arc::new(common::clock::FixedClock::new(utc(2025, 3, 1)));
    let recipient = rsa_private_key(RsaFixture::B2048)?;

    let store = KeyGroupStore::load(
        test_schedule(),
        Arc::new(test_custodian()?),
        clock.clone(),
        std::time::Duration::from_secs(1),
    )
    .await?;

    let destinations = Arc::new(destinations);
    let key_sets = Arc::new(
        CountingKeySetSource::new()
            .with_key_set(KEY_SET_URL, vec![recipient_key(&recipient, RECIPIENT_KID)]),
    );

    let resolver = Arc::new(CachingDestinationResolver::new(
        destinations.clone(),
        Duration::seconds(600),
        clock.clone(),
    ));
    let recipient_keys = Arc::new(RecipientKeyCache::new(
        key_sets.clone(),
        Duration::seconds(300),
        clock.clone(),
    ));

    let issuer = TokenIssuer::new(
        Arc::new(store),
        resolver.clone(),
        recipient_keys,
        Arc::new(JweEncryptor::new()),
        ClaimsBuilder::new(
            TEST_ISSUER,
            Duration::seconds(300),
            Duration::seconds(30),
            clock.clone(),
        ),
    );

    Ok(Harness {
        clock,
        destinations,
        key_sets,
        resolver,
        issuer,
    })
}

#[tokio::test]
async fn test_concurrent_resolves_share_one_lookup() -> Result<(), anyhow::Error> {
    let h = harness(
        CountingDestinationSource::new()
            .with_destination(DESTINATION_REF, destination())
            .with_delay(std::time::Duration::from_millis(50)),
    )
    .await?;

    let lookups = (0..16).map(|_| h.resolver.resolve(DESTINATION_REF));
    let results = futures::future::join_all(lookups).await;

    assert!(results.iter().all(|r| r.as_ref().ok() == Some(&destination())));
    assert_eq!(h.destinations.calls(), 1);

    Ok(())
}

#[tokio::test]
async fn test_destination_refetched_after_ttl() -> Result<(), anyhow::Error> {
    let h = harness(CountingDestinationSource::new().with_destination(DESTINATION_REF, destination()))
        .await?;

    h.issuer.emit(Claims::new(), DESTINATION_REF).await?;
    h.clock.advance(Duration::seconds(599));
    h.issuer.emit(Claims::new(), DESTINATION_REF).await?;
    assert_eq!(h.destinations.calls(), 1);

    h.clock.advance(Duration::seconds(2));
    h.issuer.emit(Claims::new(), DESTINATION_REF).await?;
    assert_eq!(h.destinations.calls(), 2);

    Ok(())
}

#[tokio::test]
async fn test_recipient_key_set_has_its_own_ttl() -> Result<(), anyhow::Error> {
    let h = harness(CountingDestinationSource::new().with_destination(DESTINATION_REF, destination()))
        .await?;

    h.issuer.emit(Claims::new(), DESTINATION_REF).await?;
    h.clock.advance(Duration::seconds(301));
    h.issuer.emit(Claims::new(), DESTINATION_REF).await?;

    // Key set expired, destination still cached
    assert_eq!(h.key_sets.calls(), 2);
    assert_eq!(h.destinations.calls(), 1);

    Ok(())
}

#[tokio::test]
async fn test_failed_lookup_is_not_cached() -> Result<(), anyhow::Error> {
    let h = harness(CountingDestinationSource::new().with_destination(DESTINATION_REF, destination()))
        .await?;

    h.destinations.set_failing(true);
    let err = h
        .issuer
        .emit(Claims::new(), DESTINATION_REF)
        .await
        .unwrap_err();
    assert!(matches!(err, PassportError::DestinationResolution(_)));
    assert!(!err.is_destination_not_found());

    h.destinations.set_failing(false);
    h.issuer.emit(Claims::new(), DESTINATION_REF).await?;
    assert_eq!(h.destinations.calls(), 2);

    Ok(())
}

#[tokio::test]
async fn test_unknown_destination_stops_before_signing() -> Result<(), anyhow::Error> {
    let h = harness(CountingDestinationSource::new()).await?;

    let err = h.issuer.emit(Claims::new(), "nobody").await.unwrap_err();
    assert!(err.is_destination_not_found());
    assert_eq!(h.key_sets.calls(), 0);

    Ok(())
}
