//! Time-boxed cache with a double-checked refresh.
//!
//! Reads take the shared lock and return while the entry is fresh. A miss
//! takes the exclusive lock, re-checks, and only then calls the loader, so
//! concurrent misses for one key collapse into a single load. The lock is
//! held across the load; callers queue behind it instead of racing.

use crate::errors::PassportError;
use crate::observability::metrics;
use chrono::{DateTime, Duration, Utc};
use common::clock::Clock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Cached<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// String-keyed cache whose entries expire `ttl` after they were loaded.
pub struct TtlCache<V> {
    name: &'static str,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, Cached<V>>>,
}

impl<V: Clone> TtlCache<V> {
    /// `name` labels the cache's metrics and logs.
    pub fn new(name: &'static str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn fresh(&self, cached: Option<&Cached<V>>) -> Option<V> {
        cached
            .filter(|c| self.clock.now() < c.expires_at)
            .map(|c| c.value.clone())
    }

    /// Returns the cached value for `key`, loading it on miss or expiry.
    ///
    /// A failed load evicts any stale entry and returns the loader's error.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> Result<V, PassportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, PassportError>>,
    {
        {
            let entries = self.entries.read().await;
            if let Some(value) = self.fresh(entries.get(key)) {
                metrics::record_cache_lookup(self.name, true);
                return Ok(value);
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(value) = self.fresh(entries.get(key)) {
            metrics::record_cache_lookup(self.name, true);
            return Ok(value);
        }
        metrics::record_cache_lookup(self.name, false);

        match load().await {
            Ok(value) => {
                let expires_at = self
                    .clock
                    .now()
                    .checked_add_signed(self.ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                entries.insert(
                    key.to_string(),
                    Cached {
                        value: value.clone(),
                        expires_at,
                    },
                );
                Ok(value)
            }
            Err(e) => {
                if entries.remove(key).is_some() {
                    tracing::debug!(target: "passport.cache", cache = self.name, "Evicted stale entry after failed load");
                }
                Err(e)
            }
        }
    }

    /// Drops the entry for `key`.
    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
