//! HTTP request handlers for Passport.

pub mod health;
pub mod jwks;
pub mod metrics;
pub mod tokens;

pub use health::health_check;
pub use jwks::{get_issuer_config, get_jwks, get_public_key};
pub use metrics::metrics_handler;
pub use tokens::{emit_token, issue_token};
