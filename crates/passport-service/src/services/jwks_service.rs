//! Published key set.
//!
//! The key set is not served as plain JSON: it is embedded as the `jwks`
//! claim of a short-lived envelope signed by the active publication key, so
//! consumers can authenticate it against the publication public key.

use crate::crypto::{jws, DecodedPublicKey};
use crate::errors::PassportError;
use crate::keys::{KeyGroupStore, KeyHandle, KeyUse};
use crate::observability::{metrics, outcome_label};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Duration;
use common::clock::Clock;
use common::jose::encode_segment;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// `alg` advertised for RSA keys.
pub const RSA_JWK_ALG: &str = "RS256";

/// One published key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kty: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// Standard base64 of the PEM-armored public key.
    pub x5c: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

/// Claims of the signed key-set envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySetEnvelope {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jwks: JsonWebKeySet,
}

/// Builds the JWK for one handle.
pub fn json_web_key(handle: &KeyHandle, key_use: KeyUse) -> Result<JsonWebKey, PassportError> {
    let x5c = vec![STANDARD.encode(handle.public_key_pem())];
    let base = |kty: &str, alg: &str| JsonWebKey {
        kty: kty.to_string(),
        kid: handle.kid().to_string(),
        key_use: key_use.as_str().to_string(),
        alg: alg.to_string(),
        n: None,
        e: None,
        crv: None,
        x: None,
        y: None,
        x5c: x5c.clone(),
    };

    match handle.decode_public_key()? {
        DecodedPublicKey::Rsa { n, e } => Ok(JsonWebKey {
            n: Some(encode_segment(&n)),
            e: Some(encode_segment(&e)),
            ..base("RSA", RSA_JWK_ALG)
        }),
        DecodedPublicKey::Ec { curve, x, y } => Ok(JsonWebKey {
            crv: Some(curve.crv().to_string()),
            x: Some(encode_segment(&x)),
            y: Some(encode_segment(&y)),
            ..base("EC", curve.jws_alg())
        }),
        DecodedPublicKey::Unsupported { algorithm } => {
            Err(PassportError::UnsupportedKeyType(format!(
                "{} key {} uses algorithm {algorithm}",
                handle.group(),
                handle.kid()
            )))
        }
    }
}

/// Builds and signs key-set envelopes.
pub struct JwksBuilder {
    issuer: String,
    lifetime: Duration,
    skew: Duration,
    clock: Arc<dyn Clock>,
}

impl JwksBuilder {
    pub fn new(issuer: impl Into<String>, lifetime: Duration, skew: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer: issuer.into(),
            lifetime,
            skew,
            clock,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The unsigned key set, in entry order.
    pub fn build_key_set(
        &self,
        entries: &[(&KeyHandle, KeyUse)],
    ) -> Result<JsonWebKeySet, PassportError> {
        let keys = entries
            .iter()
            .map(|(handle, key_use)| json_web_key(handle, *key_use))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(JsonWebKeySet { keys })
    }

    /// The compact signed envelope for `entries`, signed by `signer`.
    #[instrument(skip_all, fields(entries = entries.len(), signer = %signer.kid()))]
    pub async fn build(
        &self,
        entries: &[(&KeyHandle, KeyUse)],
        signer: &KeyHandle,
    ) -> Result<String, PassportError> {
        let result = self.sign_envelope(entries, signer).await;
        metrics::record_jwks_build(outcome_label(&result));
        if let Err(e) = &result {
            tracing::error!(target: "passport.jwks", error = %e, "Key set build failed");
        }
        result
    }

    async fn sign_envelope(
        &self,
        entries: &[(&KeyHandle, KeyUse)],
        signer: &KeyHandle,
    ) -> Result<String, PassportError> {
        let jwks = self.build_key_set(entries)?;

        let iat = self
            .clock
            .now()
            .checked_sub_signed(self.skew)
            .ok_or_else(|| PassportError::Internal("envelope iat out of range".to_string()))?;
        let exp = iat
            .checked_add_signed(self.lifetime)
            .ok_or_else(|| PassportError::Internal("envelope exp out of range".to_string()))?;
        let envelope = KeySetEnvelope {
            iss: self.issuer.clone(),
            iat: iat.timestamp(),
            exp: exp.timestamp(),
            jwks,
        };

        let token = jws::sign_compact(signer, &envelope).await?;
        tracing::debug!(
            target: "passport.jwks",
            key_count = envelope.jwks.keys.len(),
            "Key set envelope signed"
        );
        Ok(token)
    }

    /// Envelope for the store's current entries, signed by its active
    /// publication key.
    pub async fn publish(&self, store: &KeyGroupStore) -> Result<String, PassportError> {
        let signer = store.active_publication_key().inspect_err(|_| {
            metrics::record_jwks_build("configuration");
        })?;
        let entries = store.current_jwks_entries();
        self.build(&entries, signer).await
    }
}
