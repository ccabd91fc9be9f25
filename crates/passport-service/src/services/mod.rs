//! Engine services.
//!
//! - [`cache`]: TTL cache with a double-checked refresh
//! - [`destination`]: destination sources and the caching resolver
//! - [`recipient_keys`]: recipient key-set fetching and caching
//! - [`jwks_service`]: the signed key-set envelope
//! - [`token_issuer`]: `sign` and `emit`

pub mod cache;
pub mod destination;
pub mod jwks_service;
pub mod recipient_keys;
pub mod token_issuer;
