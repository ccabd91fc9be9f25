//! Metrics definitions for Passport.
//!
//! All metrics follow Prometheus naming conventions:
//! - `passport_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `operation`: `sign`, `emit`, `custodian.public_key`, `custodian.sign`
//! - `status`: `success`, `timeout`, `error`, or an error category
//! - `cache`: `destinations`, `recipient_keys`
//! - `group`: `jwt`, `jose`, `jwks`
//! - `endpoint`: the route templates plus `/other`
//!
//! Destination references and key set URLs are never used as labels.

use crate::keys::KeyGroup;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `passport_http_requests_total`, `passport_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);
    let status = categorize_status_code(status_code);

    histogram!("passport_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("passport_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Maps a request path to its route template. Destination references in
/// the path never become label values.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/.well-known/jwks" => "/.well-known/jwks",
        "/public-key" => "/public-key",
        "/internal/issuer-config" => "/internal/issuer-config",
        "/api/v1/tokens" => "/api/v1/tokens",
        _ => {
            let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
            match segments.as_slice() {
                ["api", "v1", "destinations", _, "tokens"] => {
                    "/api/v1/destinations/{reference}/tokens"
                }
                _ => "/other",
            }
        }
    }
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record token issuance duration and outcome
///
/// Metric: `passport_token_issuance_duration_seconds`, `passport_token_issuance_total`
/// Labels: `operation`, `status`
pub fn record_token_issuance(operation: &str, status: &str, duration: Duration) {
    histogram!("passport_token_issuance_duration_seconds",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("passport_token_issuance_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Key Set Metrics
// ============================================================================

/// Record a key set envelope build
///
/// Metric: `passport_jwks_builds_total`
/// Labels: `status`
pub fn record_jwks_build(status: &str) {
    counter!("passport_jwks_builds_total", "status" => status.to_string()).increment(1);
}

/// Set the number of currently visible keys in a group
///
/// Metric: `passport_visible_keys`
/// Labels: `group`
#[allow(clippy::cast_precision_loss)]
pub fn set_visible_keys(group: KeyGroup, count: usize) {
    gauge!("passport_visible_keys", "group" => group.as_str()).set(count as f64);
}

// ============================================================================
// Cache Metrics
// ============================================================================

/// Record a cache lookup
///
/// Metric: `passport_cache_lookups_total`
/// Labels: `cache`, `result` (hit, miss)
pub fn record_cache_lookup(cache: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("passport_cache_lookups_total", "cache" => cache, "result" => result).increment(1);
}

// ============================================================================
// Custodian Metrics
// ============================================================================

/// Record a custodian call
///
/// Metric: `passport_custodian_calls_total`, `passport_custodian_call_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_custodian_call(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("passport_custodian_call_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("passport_custodian_calls_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}
