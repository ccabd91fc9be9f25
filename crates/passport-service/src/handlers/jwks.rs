//! Key publication endpoints.

use crate::errors::PassportError;
use crate::routes::AppState;
use crate::keys::IssuerConfig;
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Media type of the signed key-set envelope.
pub const JWKS_CONTENT_TYPE: &str = "application/jwt";

/// Clients may cache the envelope for an hour.
pub const JWKS_CACHE_CONTROL: &str = "max-age=3600";

/// Handler for GET /.well-known/jwks
///
/// Returns the compact signed envelope whose `jwks` claim holds the active
/// encryption key and every visible signing key.
#[instrument(skip_all, name = "passport.jwks.get")]
pub async fn get_jwks(State(state): State<Arc<AppState>>) -> Result<Response, PassportError> {
    let envelope = state.jwks.publish(&state.store).await?;

    Ok((
        [
            (header::CONTENT_TYPE, JWKS_CONTENT_TYPE),
            (header::CACHE_CONTROL, JWKS_CACHE_CONTROL),
        ],
        envelope,
    )
        .into_response())
}

/// Handler for GET /public-key
///
/// PEM of the active publication key, for verifying the key-set envelope.
#[instrument(skip_all, name = "passport.public_key.get")]
pub async fn get_public_key(
    State(state): State<Arc<AppState>>,
) -> Result<Response, PassportError> {
    let pem = state.store.publication_public_key_pem()?;
    Ok(([(header::CONTENT_TYPE, "application/x-pem-file")], pem).into_response())
}

/// Handler for GET /internal/issuer-config
///
/// Custodian key identifier behind each visible signing `kid` and the active
/// publication `kid`.
#[instrument(skip_all, name = "passport.issuer_config.get")]
pub async fn get_issuer_config(State(state): State<Arc<AppState>>) -> Json<IssuerConfig> {
    Json(state.store.issuer_config(state.jwks.issuer()))
}
