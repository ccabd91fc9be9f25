//! Common utilities and types shared across Passport components.

#![warn(clippy::pedantic)]

/// Module for the injectable clock used by every time-dependent component
pub mod clock;

/// Module for common configuration
pub mod config;

/// Module for JOSE compact serialization helpers (segments, headers, `kid`)
pub mod jose;
