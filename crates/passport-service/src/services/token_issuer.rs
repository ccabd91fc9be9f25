//! Token issuance.
//!
//! `sign` produces a compact JWS with the active signing key. `emit` adds
//! destination resolution and wraps the JWS in a JWE for the destination's
//! recipient key. Any failing step aborts the rest.

use crate::crypto::jwe::Encryptor;
use crate::crypto::{generate_jti, jws};
use crate::errors::PassportError;
use crate::keys::KeyGroupStore;
use crate::observability::{hash_for_correlation, metrics, outcome_label};
use crate::services::destination::DestinationResolver;
use crate::services::recipient_keys::RecipientKeyCache;
use chrono::Duration;
use common::clock::Clock;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// A JSON claim set.
pub type Claims = Map<String, Value>;

/// Builds full claim sets from caller claims.
pub struct ClaimsBuilder {
    issuer: String,
    lifetime: Duration,
    skew: Duration,
    clock: Arc<dyn Clock>,
}

impl ClaimsBuilder {
    pub fn new(issuer: impl Into<String>, lifetime: Duration, skew: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer: issuer.into(),
            lifetime,
            skew,
            clock,
        }
    }

    /// Merges `custom` over `{iat, exp, nbf, jti, iss}`. Caller keys win.
    pub fn build(&self, custom: Claims) -> Result<Claims, PassportError> {
        let iat = self.clock.now().timestamp();
        let exp = iat
            .checked_add(self.lifetime.num_seconds())
            .ok_or_else(|| PassportError::Internal("exp out of range".to_string()))?;
        let nbf = iat
            .checked_sub(self.skew.num_seconds())
            .ok_or_else(|| PassportError::Internal("nbf out of range".to_string()))?;

        let mut claims = Map::new();
        claims.insert("iat".to_string(), Value::from(iat));
        claims.insert("exp".to_string(), Value::from(exp));
        claims.insert("nbf".to_string(), Value::from(nbf));
        claims.insert("jti".to_string(), Value::from(generate_jti()?));
        claims.insert("iss".to_string(), Value::from(self.issuer.clone()));
        claims.extend(custom);
        Ok(claims)
    }
}

/// Signs and emits tokens.
pub struct TokenIssuer {
    store: Arc<KeyGroupStore>,
    resolver: Arc<dyn DestinationResolver>,
    recipient_keys: Arc<RecipientKeyCache>,
    encryptor: Arc<dyn Encryptor>,
    claims: ClaimsBuilder,
}

impl TokenIssuer {
    pub fn new(
        store: Arc<KeyGroupStore>,
        resolver: Arc<dyn DestinationResolver>,
        recipient_keys: Arc<RecipientKeyCache>,
        encryptor: Arc<dyn Encryptor>,
        claims: ClaimsBuilder,
    ) -> Self {
        Self {
            store,
            resolver,
            recipient_keys,
            encryptor,
            claims,
        }
    }

    /// Compact JWS over the caller's claims merged with the base claims.
    #[instrument(skip_all)]
    pub async fn sign(&self, claims: Claims) -> Result<String, PassportError> {
        let start = Instant::now();
        let result = self.sign_claims(claims).await;
        metrics::record_token_issuance("sign", outcome_label(&result), start.elapsed());
        result
    }

    async fn sign_claims(&self, claims: Claims) -> Result<String, PassportError> {
        let claims = self.claims.build(claims)?;
        let signer = self.store.active_signer()?;
        let token = jws::sign_compact(signer, &claims).await?;
        tracing::debug!(target: "passport.issuer", kid = %signer.kid(), "Token signed");
        Ok(token)
    }

    /// Compact JWE, for the destination's recipient key, of a JWS whose
    /// `aud` is the destination audience.
    #[instrument(skip_all, fields(destination = %hash_for_correlation(reference)))]
    pub async fn emit(&self, claims: Claims, reference: &str) -> Result<String, PassportError> {
        let start = Instant::now();
        let result = self.emit_claims(claims, reference).await;
        metrics::record_token_issuance("emit", outcome_label(&result), start.elapsed());
        if let Err(e) = &result {
            tracing::warn!(
                target: "passport.issuer",
                destination = %hash_for_correlation(reference),
                error = %e,
                "Token emission failed"
            );
        }
        result
    }

    async fn emit_claims(&self, claims: Claims, reference: &str) -> Result<String, PassportError> {
        let destination = self
            .resolver
            .resolve(reference)
            .await
            .map_err(|e| PassportError::DestinationResolution(Box::new(e)))?;

        let mut claims = self.claims.build(claims)?;
        claims.insert("aud".to_string(), Value::from(destination.audience.clone()));

        let signer = self.store.active_signer()?;
        let signed = jws::sign_compact(signer, &claims).await?;

        let recipient = self
            .recipient_keys
            .get_key(
                &destination.recipient_key_set_url,
                &destination.recipient_key_id,
            )
            .await?;

        let token = self.encryptor.encrypt(signed.as_bytes(), &recipient)?;
        tracing::debug!(
            target: "passport.issuer",
            kid = %signer.kid(),
            recipient_kid = %recipient.kid,
            "Token emitted"
        );
        Ok(token)
    }

    pub fn store(&self) -> &Arc<KeyGroupStore> {
        &self.store
    }
}
