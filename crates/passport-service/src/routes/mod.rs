//! HTTP routes for Passport.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::keys::KeyGroupStore;
use crate::middleware::http_metrics_middleware;
use crate::services::jwks_service::JwksBuilder;
use crate::services::token_issuer::TokenIssuer;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<KeyGroupStore>,

    pub issuer: Arc<TokenIssuer>,

    pub jwks: Arc<JwksBuilder>,

    pub config: Config,
}

/// Installs the global Prometheus recorder and returns its handle.
///
/// Fails if a recorder is already installed in this process.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("passport_token_issuance".to_string()),
            &[0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500],
        )
        .map_err(|e| format!("Failed to set token issuance buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("passport_custodian_call".to_string()),
            &[0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 5.000],
        )
        .map_err(|e| format!("Failed to set custodian call buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("passport_http_request".to_string()),
            &[0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Build the application routes.
///
/// - `/health`, `/.well-known/jwks`, `/public-key`, `/metrics`
/// - `/internal/issuer-config`
/// - `/api/v1/tokens` and `/api/v1/destinations/:reference/tokens`
/// - TraceLayer, the configured request timeout, and HTTP metrics
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let request_timeout = Duration::from_secs(state.config.request_timeout_seconds);

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/.well-known/jwks", get(handlers::get_jwks))
        .route("/public-key", get(handlers::get_public_key))
        .route("/internal/issuer-config", get(handlers::get_issuer_config))
        .route("/api/v1/tokens", post(handlers::issue_token))
        .route(
            "/api/v1/destinations/:reference/tokens",
            post(handlers::emit_token),
        )
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. http_metrics_middleware - sees every response (outermost)
    // 2. TimeoutLayer
    // 3. TraceLayer
    public_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(http_metrics_middleware))
}
