//! Destination resolution.
//!
//! A destination reference names a downstream consumer. Resolving it yields
//! the audience to stamp into emitted tokens and where to find the
//! consumer's encryption key.

use crate::errors::PassportError;
use crate::observability::hash_for_correlation;
use crate::services::cache::TtlCache;
use common::clock::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Resolved destination metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Value of the emitted token's `aud` claim.
    pub audience: String,
    /// `kid` of the recipient's encryption key.
    pub recipient_key_id: String,
    /// URL of the recipient's published key set.
    pub recipient_key_set_url: String,
}

/// Backing store of destinations.
#[async_trait::async_trait]
pub trait DestinationSource: Send + Sync {
    /// Looks up `reference`; a missing entry is `DestinationNotFound`.
    async fn load(&self, reference: &str) -> Result<Destination, PassportError>;
}

/// Destinations held in memory, typically from the configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticDestinationSource {
    destinations: HashMap<String, Destination>,
}

impl StaticDestinationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(destinations: HashMap<String, Destination>) -> Self {
        Self { destinations }
    }

    pub fn register(mut self, reference: impl Into<String>, destination: Destination) -> Self {
        self.destinations.insert(reference.into(), destination);
        self
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

#[async_trait::async_trait]
impl DestinationSource for StaticDestinationSource {
    async fn load(&self, reference: &str) -> Result<Destination, PassportError> {
        self.destinations
            .get(reference)
            .cloned()
            .ok_or_else(|| PassportError::DestinationNotFound {
                reference: reference.to_string(),
            })
    }
}

/// Resolves a destination reference.
#[async_trait::async_trait]
pub trait DestinationResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<Destination, PassportError>;
}

/// Resolver that caches source results for a fixed TTL.
pub struct CachingDestinationResolver {
    source: Arc<dyn DestinationSource>,
    cache: TtlCache<Destination>,
}

impl CachingDestinationResolver {
    pub fn new(source: Arc<dyn DestinationSource>, ttl: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            cache: TtlCache::new("destinations", ttl, clock),
        }
    }
}

#[async_trait::async_trait]
impl DestinationResolver for CachingDestinationResolver {
    #[instrument(skip_all, fields(reference = %hash_for_correlation(reference)))]
    async fn resolve(&self, reference: &str) -> Result<Destination, PassportError> {
        self.cache
            .get_or_load(reference, || async {
                tracing::debug!(
                    target: "passport.cache",
                    reference = %hash_for_correlation(reference),
                    "Destination cache miss"
                );
                self.source.load(reference).await.map_err(|source| {
                    PassportError::DestinationLookup {
                        reference: reference.to_string(),
                        source: Box::new(source),
                    }
                })
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use common::clock::FixedClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn partner() -> Destination {
        Destination {
            audience: "https://partner-a.example/api".to_string(),
            recipient_key_id: "partner-a-enc-1".to_string(),
            recipient_key_set_url: "https://partner-a.example/.well-known/jwks.json".to_string(),
        }
    }

    /// Counts loads and yields once so concurrent callers interleave.
    struct CountingSource {
        inner: StaticDestinationSource,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DestinationSource for CountingSource {
        async fn load(&self, reference: &str) -> Result<Destination, PassportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.inner.load(reference).await
        }
    }

    fn setup() -> (CachingDestinationResolver, Arc<CountingSource>, Arc<FixedClock>) {
        let source = Arc::new(CountingSource {
            inner: StaticDestinationSource::new().register("partnerA", partner()),
            calls: AtomicUsize::new(0),
        });
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        ));
        let resolver =
            CachingDestinationResolver::new(source.clone(), Duration::seconds(600), clock.clone());
        (resolver, source, clock)
    }

    #[tokio::test]
    async fn test_static_source_not_found() {
        let source = StaticDestinationSource::new();
        assert!(source.is_empty());
        assert!(matches!(
            source.load("nobody").await,
            Err(PassportError::DestinationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_lookup() {
        let (resolver, source, _) = setup();

        let (a, b) = tokio::join!(resolver.resolve("partnerA"), resolver.resolve("partnerA"));
        assert_eq!(a.unwrap(), partner());
        assert_eq!(b.unwrap(), partner());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_triggers_one_refetch() {
        let (resolver, source, clock) = setup();

        resolver.resolve("partnerA").await.unwrap();
        clock.advance(Duration::seconds(300));
        resolver.resolve("partnerA").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::seconds(301));
        resolver.resolve("partnerA").await.unwrap();
        resolver.resolve("partnerA").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_source_error_is_wrapped_with_reference() {
        let (resolver, _, _) = setup();

        let err = resolver.resolve("unknown").await.unwrap_err();
        match &err {
            PassportError::DestinationLookup { reference, source } => {
                assert_eq!(reference, "unknown");
                assert!(matches!(
                    source.as_ref(),
                    PassportError::DestinationNotFound { .. }
                ));
            }
            other => unreachable!("unexpected {other:?}"),
        }
        assert!(err.is_destination_not_found());
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let (resolver, source, _) = setup();

        assert!(resolver.resolve("unknown").await.is_err());
        assert!(resolver.resolve("unknown").await.is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
