//! Wires configuration and collaborators into [`AppState`].
//!
//! Shared by the binary and the test harness so both run the same
//! construction path.

use crate::config::{Config, KeyScheduleFile};
use crate::crypto::jwe::JweEncryptor;
use crate::custodian::KeyCustodian;
use crate::errors::PassportError;
use crate::keys::KeyGroupStore;
use crate::routes::AppState;
use crate::services::destination::{CachingDestinationResolver, StaticDestinationSource};
use crate::services::jwks_service::JwksBuilder;
use crate::services::recipient_keys::{KeySetSource, RecipientKeyCache};
use crate::services::token_issuer::{ClaimsBuilder, TokenIssuer};
use chrono::Duration;
use common::clock::Clock;
use std::sync::Arc;
use tracing::instrument;

/// External capabilities the engine depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub custodian: Arc<dyn KeyCustodian>,
    pub key_sets: Arc<dyn KeySetSource>,
    pub clock: Arc<dyn Clock>,
}

fn seconds(name: &str, value: i64) -> Result<Duration, PassportError> {
    Duration::try_seconds(value)
        .ok_or_else(|| PassportError::Configuration(format!("{name} out of range: {value}")))
}

/// Loads every key and builds the shared state.
///
/// Fails if the schedule is unusable or any key cannot be loaded.
#[instrument(skip_all)]
pub async fn build_state(
    config: Config,
    schedule: &KeyScheduleFile,
    collaborators: Collaborators,
) -> Result<AppState, PassportError> {
    let Collaborators {
        custodian,
        key_sets,
        clock,
    } = collaborators;

    let store = Arc::new(
        KeyGroupStore::load(
            schedule.key_schedule(),
            custodian,
            clock.clone(),
            std::time::Duration::from_millis(config.custodian_timeout_ms),
        )
        .await?,
    );

    let destinations = StaticDestinationSource::from_map(schedule.destinations());
    tracing::info!(
        target: "passport.keys",
        destinations = destinations.len(),
        "Static destinations loaded"
    );

    let resolver = CachingDestinationResolver::new(
        Arc::new(destinations),
        seconds(
            "DESTINATION_CACHE_TTL_SECONDS",
            config.destination_cache_ttl_seconds,
        )?,
        clock.clone(),
    );

    let recipient_keys = RecipientKeyCache::new(
        key_sets,
        seconds(
            "RECIPIENT_KEYS_CACHE_TTL_SECONDS",
            config.recipient_keys_cache_ttl_seconds,
        )?,
        clock.clone(),
    );

    let claims = ClaimsBuilder::new(
        schedule.issuer.clone(),
        seconds("TOKEN_LIFETIME_SECONDS", config.token_lifetime_seconds)?,
        seconds("CLOCK_SKEW_SECONDS", config.clock_skew_seconds)?,
        clock.clone(),
    );

    let jwks_lifetime = Duration::try_hours(config.jwks_lifetime_hours).ok_or_else(|| {
        PassportError::Configuration(format!(
            "JWKS_LIFETIME_HOURS out of range: {}",
            config.jwks_lifetime_hours
        ))
    })?;
    let jwks = JwksBuilder::new(
        schedule.issuer.clone(),
        jwks_lifetime,
        seconds("JWKS_SKEW_SECONDS", config.jwks_skew_seconds)?,
        clock,
    );

    let issuer = TokenIssuer::new(
        store.clone(),
        Arc::new(resolver),
        Arc::new(recipient_keys),
        Arc::new(JweEncryptor::new()),
        claims,
    );

    Ok(AppState {
        store,
        issuer: Arc::new(issuer),
        jwks: Arc::new(jwks),
        config,
    })
}
