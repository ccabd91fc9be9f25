//! Passport: token issuance backed by custodian-held keys.
//!
//! Keys live in an external custodian and are organized into three groups
//! (`jwt` signs tokens, `jose` is published for encryption, `jwks` signs the
//! published key set). Each group follows an operator-declared rotation
//! schedule; the active key and the set of published keys are evaluated
//! against the clock on every call.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> keys/*.rs -> custodian/*.rs
//! ```
//!
//! # Modules
//!
//! - `app` - Builds the shared state from configuration
//! - `config` - Environment configuration and the YAML key schedule
//! - `crypto` - Public key decoding, JWS assembly, JWE encryption
//! - `custodian` - The key custodian seam (KMS and in-memory)
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `keys` - Schedules, key handles, and the key group store
//! - `middleware` - HTTP metrics
//! - `models` - Request and response bodies
//! - `observability` - Metrics and log correlation helpers
//! - `routes` - Axum router setup
//! - `services` - Caches, destination resolution, key set publication, issuance

pub mod app;
pub mod config;
pub mod crypto;
pub mod custodian;
pub mod errors;
pub mod handlers;
pub mod keys;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
