//! Token endpoints.

use crate::errors::PassportError;
use crate::models::{TokenRequest, TokenResponse};
use crate::routes::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

fn request_body(
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<TokenRequest, PassportError> {
    body.map(|Json(request)| request)
        .map_err(|rejection| PassportError::InvalidRequest(rejection.body_text()))
}

/// Handler for POST /api/v1/tokens
///
/// Signs the caller's claims with the active signing key.
#[instrument(skip_all, name = "passport.tokens.sign")]
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, PassportError> {
    let request = request_body(body)?;
    let token = state.issuer.sign(request.claims).await?;
    Ok(Json(TokenResponse { token }))
}

/// Handler for POST /api/v1/destinations/:reference/tokens
///
/// Signs the caller's claims for the destination's audience and encrypts
/// the result for the destination's recipient key.
#[instrument(skip_all, name = "passport.tokens.emit")]
pub async fn emit_token(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, PassportError> {
    let request = request_body(body)?;
    let token = state.issuer.emit(request.claims, &reference).await?;
    Ok(Json(TokenResponse { token }))
}
