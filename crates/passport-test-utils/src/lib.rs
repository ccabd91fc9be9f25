//! # Passport Test Utilities
//!
//! Shared test utilities for Passport.
//!
//! This crate provides:
//! - Fixed RSA keys and a mock custodian preloaded with a rotation schedule
//! - Counting destination and key-set sources
//! - Server test harness (`TestPassportServer` for E2E tests)
//! - Custom assertions (`TokenAssertions` trait)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use passport_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let server = TestPassportServer::spawn(TestPassportOptions::at(utc(2025, 3, 1))).await?;
//!     let token = server.issue_token(json!({"sub": "alice"})).await?;
//!
//!     token
//!         .assert_valid_jws()
//!         .assert_header("alg", "PS256")
//!         .assert_claim("sub", "alice");
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;
pub mod schedules;
pub mod server_harness;
pub mod sources;

// Re-export commonly used items
pub use assertions::*;
pub use crypto_fixtures::*;
pub use schedules::*;
pub use server_harness::*;
pub use sources::*;
