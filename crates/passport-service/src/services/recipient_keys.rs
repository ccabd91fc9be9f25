//! Recipient encryption keys.
//!
//! Each destination publishes a key set. Sets are fetched over HTTP and
//! cached per URL; a recipient key is then picked from the cached set by
//! `kid`.

use crate::errors::PassportError;
use crate::observability::hash_for_correlation;
use crate::services::cache::TtlCache;
use common::clock::Clock;
use common::jose::decode_segment;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// JSON Web Key as published by a recipient.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,

    #[serde(default)]
    pub kid: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

/// Key set document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// Public material of a recipient key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientKeyMaterial {
    /// Big-endian modulus and exponent.
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Unsupported { kty: String },
}

/// One key of a recipient's key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientKey {
    pub kid: String,
    pub alg: Option<String>,
    pub material: RecipientKeyMaterial,
}

impl RecipientKey {
    /// Converts a published JWK. Keys without `kid` cannot be addressed and
    /// yield `None`.
    pub fn from_jwk(jwk: Jwk) -> Result<Option<Self>, PassportError> {
        let Some(kid) = jwk.kid else {
            return Ok(None);
        };

        let material = match (jwk.kty.as_str(), &jwk.n, &jwk.e) {
            ("RSA", Some(n), Some(e)) => RecipientKeyMaterial::Rsa {
                n: decode_segment(n).map_err(|err| {
                    PassportError::RecipientKey(format!("key {kid}: invalid modulus: {err}"))
                })?,
                e: decode_segment(e).map_err(|err| {
                    PassportError::RecipientKey(format!("key {kid}: invalid exponent: {err}"))
                })?,
            },
            ("RSA", _, _) => {
                return Err(PassportError::RecipientKey(format!(
                    "key {kid}: RSA key without n/e"
                )))
            }
            (kty, _, _) => RecipientKeyMaterial::Unsupported {
                kty: kty.to_string(),
            },
        };

        Ok(Some(Self {
            kid,
            alg: jwk.alg,
            material,
        }))
    }
}

/// Parses a key set document.
pub fn parse_key_set(body: &[u8]) -> Result<Vec<RecipientKey>, PassportError> {
    let jwks: JwksResponse = serde_json::from_slice(body)
        .map_err(|e| PassportError::RecipientKey(format!("unparsable key set: {e}")))?;

    let mut keys = Vec::with_capacity(jwks.keys.len());
    for jwk in jwks.keys {
        if let Some(key) = RecipientKey::from_jwk(jwk)? {
            keys.push(key);
        }
    }
    Ok(keys)
}

/// Where recipient key sets come from.
#[async_trait::async_trait]
pub trait KeySetSource: Send + Sync {
    async fn fetch_key_set(&self, url: &str) -> Result<Vec<RecipientKey>, PassportError>;
}

/// Fetches key sets over HTTP with a bounded client.
pub struct HttpKeySetSource {
    http_client: reqwest::Client,
}

impl HttpKeySetSource {
    pub fn new(timeout: Duration) -> Result<Self, PassportError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PassportError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http_client })
    }
}

#[async_trait::async_trait]
impl KeySetSource for HttpKeySetSource {
    #[instrument(skip_all, fields(url = %hash_for_correlation(url)))]
    async fn fetch_key_set(&self, url: &str) -> Result<Vec<RecipientKey>, PassportError> {
        let response = self.http_client.get(url).send().await.map_err(|e| {
            tracing::warn!(target: "passport.cache", error = %e, "Failed to fetch recipient key set");
            if e.is_timeout() {
                PassportError::Timeout {
                    operation: "key_set.fetch".to_string(),
                }
            } else {
                PassportError::RecipientKey(format!("key set fetch failed: {e}"))
            }
        })?;

        if !response.status().is_success() {
            tracing::warn!(
                target: "passport.cache",
                status = %response.status(),
                "Key set endpoint returned error"
            );
            return Err(PassportError::RecipientKey(format!(
                "key set endpoint returned {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PassportError::RecipientKey(format!("key set body unreadable: {e}")))?;

        let keys = parse_key_set(&body)?;
        tracing::info!(target: "passport.cache", key_count = keys.len(), "Fetched recipient key set");
        Ok(keys)
    }
}

/// Recipient key sets cached per URL.
pub struct RecipientKeyCache {
    source: Arc<dyn KeySetSource>,
    cache: TtlCache<Arc<Vec<RecipientKey>>>,
}

impl RecipientKeyCache {
    pub fn new(source: Arc<dyn KeySetSource>, ttl: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            cache: TtlCache::new("recipient_keys", ttl, clock),
        }
    }

    /// The key `kid` from the set at `url`.
    ///
    /// A `kid` absent from a fresh set is an error; the set is not refetched
    /// until its TTL runs out.
    #[instrument(skip_all, fields(kid = %kid))]
    pub async fn get_key(&self, url: &str, kid: &str) -> Result<RecipientKey, PassportError> {
        let keys = self
            .cache
            .get_or_load(url, || async {
                self.source.fetch_key_set(url).await.map(Arc::new)
            })
            .await?;

        keys.iter().find(|key| key.kid == kid).cloned().ok_or_else(|| {
            tracing::warn!(target: "passport.cache", kid = %kid, "Recipient key not in key set");
            PassportError::RecipientKey(format!("no key {kid} in recipient key set"))
        })
    }
}
