//! Key lifecycle: schedules, handles, and the per-group store.
//!
//! - [`schedule`] derives expiry from the activation dates of a group
//!   and answers "active at" / "visible at" questions
//! - [`handle`] wraps one custodian key with its public material and `kid`
//! - [`store`] holds the three groups and evaluates them against a clock

pub mod handle;
pub mod schedule;
pub mod store;

pub use handle::{derive_kid, KeyHandle, KeySpec, PublicKeyDescriptor, SigningMethod};
pub use schedule::{
    active_key_at, apply_expiration_policy, visible_keys_at, KeyEntry, KeySchedule, Scheduled,
};
pub use store::{IssuerConfig, KeyGroupStore};

use serde::Serialize;
use std::fmt;

/// The three independent key sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyGroup {
    /// Signs issued tokens.
    Jwt,
    /// Published for encryption (`use: enc`).
    Jose,
    /// Signs the published key-set envelope.
    Jwks,
}

impl KeyGroup {
    pub const ALL: [KeyGroup; 3] = [KeyGroup::Jwt, KeyGroup::Jose, KeyGroup::Jwks];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyGroup::Jwt => "jwt",
            KeyGroup::Jose => "jose",
            KeyGroup::Jwks => "jwks",
        }
    }
}

impl fmt::Display for KeyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWK `use` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyUse {
    #[serde(rename = "sig")]
    Signature,
    #[serde(rename = "enc")]
    Encryption,
}

impl KeyUse {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyUse::Signature => "sig",
            KeyUse::Encryption => "enc",
        }
    }
}
