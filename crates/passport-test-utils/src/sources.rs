//! Counting collaborators
//!
//! Wrap fixed data and count lookups so tests can assert on cache behavior.

use passport_service::errors::PassportError;
use passport_service::services::destination::{Destination, DestinationSource};
use passport_service::services::recipient_keys::{KeySetSource, RecipientKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Destination source with call counting and optional latency.
#[derive(Default)]
pub struct CountingDestinationSource {
    destinations: HashMap<String, Destination>,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl CountingDestinationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_destination(mut self, reference: impl Into<String>, destination: Destination) -> Self {
        self.destinations.insert(reference.into(), destination);
        self
    }

    /// Delays every lookup, widening the window for concurrent callers.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes every subsequent lookup fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DestinationSource for CountingDestinationSource {
    async fn load(&self, reference: &str) -> Result<Destination, PassportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PassportError::Internal("destination backend down".to_string()));
        }
        self.destinations
            .get(reference)
            .cloned()
            .ok_or_else(|| PassportError::DestinationNotFound {
                reference: reference.to_string(),
            })
    }
}

/// Key-set source serving fixed keys per URL.
#[derive(Default)]
pub struct CountingKeySetSource {
    key_sets: HashMap<String, Vec<RecipientKey>>,
    calls: AtomicUsize,
}

impl CountingKeySetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_set(mut self, url: impl Into<String>, keys: Vec<RecipientKey>) -> Self {
        self.key_sets.insert(url.into(), keys);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl KeySetSource for CountingKeySetSource {
    async fn fetch_key_set(&self, url: &str) -> Result<Vec<RecipientKey>, PassportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.key_sets
            .get(url)
            .cloned()
            .ok_or_else(|| PassportError::RecipientKey(format!("no key set at {url}")))
    }
}
