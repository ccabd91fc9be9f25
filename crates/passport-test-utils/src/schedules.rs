//! A rotation schedule and matching mock custodian.
//!
//! | group | key id            | material          | use_from   |
//! |-------|-------------------|-------------------|------------|
//! | jwt   | `alias/jwt-2024`  | RSA-2048 (PS256)  | 2024-01-01 |
//! | jwt   | `alias/jwt-2025`  | P-256 (ES256)     | 2025-01-01 |
//! | jose  | `alias/jose-2024` | RSA-3072          | 2024-01-01 |
//! | jwks  | `alias/jwks-2024` | P-384 (ES384)     | 2024-01-01 |
//!
//! With the default 180-day overlap `alias/jwt-2024` stays published until
//! 2025-06-30.

use crate::crypto_fixtures::{rsa_private_key, FixtureError, RsaFixture};
use chrono::{DateTime, TimeZone, Utc};
use passport_service::custodian::mock::MockCustodian;
use passport_service::keys::{KeyEntry, KeySchedule};

pub const TEST_ISSUER: &str = "https://auth.example.com";

pub const JWT_KEY_2024: &str = "alias/jwt-2024";
pub const JWT_KEY_2025: &str = "alias/jwt-2025";
pub const JOSE_KEY_2024: &str = "alias/jose-2024";
pub const JWKS_KEY_2024: &str = "alias/jwks-2024";

pub const DESTINATION_REF: &str = "partnerA";
pub const DESTINATION_AUDIENCE: &str = "https://partner-a.example/api";
pub const RECIPIENT_KID: &str = "partner-a-enc-1";

pub const OVERLAP_DAYS: u32 = 180;

/// Midnight UTC on the given date.
pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid test date {year}-{month}-{day}"))
}

/// Mock custodian holding every key of [`test_schedule`].
pub fn test_custodian() -> Result<MockCustodian, FixtureError> {
    Ok(MockCustodian::new()
        .with_rsa_key(JWT_KEY_2024, rsa_private_key(RsaFixture::A2048)?)
        .with_p256_seed(JWT_KEY_2025, 11)
        .with_rsa_key(JOSE_KEY_2024, rsa_private_key(RsaFixture::C3072)?)
        .with_p384_seed(JWKS_KEY_2024, 21))
}

/// The schedule in the module table, before the expiration policy.
pub fn test_schedule() -> KeySchedule {
    KeySchedule {
        overlap_days: OVERLAP_DAYS,
        jwt: vec![
            KeyEntry::new(JWT_KEY_2024, utc(2024, 1, 1)),
            KeyEntry::new(JWT_KEY_2025, utc(2025, 1, 1)),
        ],
        jose: vec![KeyEntry::new(JOSE_KEY_2024, utc(2024, 1, 1))],
        jwks: vec![KeyEntry::new(JWKS_KEY_2024, utc(2024, 1, 1))],
    }
}

/// The same schedule as a YAML file, with one destination whose key set
/// lives at `key_set_url`.
pub fn test_schedule_yaml(key_set_url: &str) -> String {
    format!(
        r#"issuer: {TEST_ISSUER}
expires_policy:
  overlap_days: {OVERLAP_DAYS}
keys:
  jwt:
    - key_id: {JWT_KEY_2024}
      use_from: 2024-01-01T00:00:00Z
    - key_id: {JWT_KEY_2025}
      use_from: 2025-01-01T00:00:00Z
  jose:
    - key_id: {JOSE_KEY_2024}
      use_from: 2024-01-01T00:00:00Z
  jwks:
    - key_id: {JWKS_KEY_2024}
      use_from: 2024-01-01T00:00:00Z
destinations:
  {DESTINATION_REF}:
    audience: {DESTINATION_AUDIENCE}
    kid: {RECIPIENT_KID}
    jwks_url: {key_set_url}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use passport_service::config::KeyScheduleFile;

    #[test]
    fn test_yaml_matches_schedule() {
        let file = KeyScheduleFile::from_yaml_str(&test_schedule_yaml(
            "http://127.0.0.1:1/jwks.json",
        ))
        .unwrap();
        assert_eq!(file.issuer, TEST_ISSUER);
        assert_eq!(file.key_schedule(), test_schedule());
        assert_eq!(file.destinations().len(), 1);
    }
}
