//! Passport configuration.
//!
//! Two sources:
//! - environment variables ([`Config::from_env`]) for process settings
//! - a YAML key schedule file ([`KeyScheduleFile::load`]) naming the
//!   custodian keys per group, their activation dates, the overlap policy,
//!   and the static destinations

use crate::keys::{KeyEntry, KeyGroup, KeySchedule};
use crate::services::destination::Destination;
use chrono::{DateTime, Utc};
use common::config::{LogFormat, ObservabilityConfig};
use common::jose::MAX_CLOCK_SKEW;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_KMS_CONFIG_PATH: &str = "config/kms-keys.yaml";
pub const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 300;
pub const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 30;
pub const DEFAULT_JWKS_LIFETIME_HOURS: i64 = 24;
pub const DEFAULT_JWKS_SKEW_SECONDS: i64 = 300;
pub const DEFAULT_DESTINATION_CACHE_TTL_SECONDS: i64 = 600;
pub const DEFAULT_RECIPIENT_KEYS_CACHE_TTL_SECONDS: i64 = 600;
pub const DEFAULT_CUSTODIAN_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_KEY_SET_FETCH_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_LOG_FILTER: &str = "passport_service=info,tower_http=info";

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Path of the YAML key schedule.
    pub kms_config_path: String,

    /// Lifetime of issued tokens (`exp - iat`).
    pub token_lifetime_seconds: i64,

    /// Subtracted from `iat` to form `nbf`.
    pub clock_skew_seconds: i64,

    /// Lifetime of the published key-set envelope.
    pub jwks_lifetime_hours: i64,

    /// Subtracted from `now` to form the envelope's `iat`.
    pub jwks_skew_seconds: i64,

    pub destination_cache_ttl_seconds: i64,

    pub recipient_keys_cache_ttl_seconds: i64,

    /// Deadline for each custodian call.
    pub custodian_timeout_ms: u64,

    /// Request timeout of the HTTP client fetching recipient key sets.
    pub key_set_fetch_timeout_ms: u64,

    /// Per-request timeout of the HTTP host.
    pub request_timeout_seconds: u64,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Failed to read key schedule {path}: {source}")]
    ScheduleRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse key schedule: {0}")]
    ScheduleParse(String),

    #[error("Invalid key schedule: {0}")]
    InvalidSchedule(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let kms_config_path = vars
            .get("KMS_CONFIG_PATH")
            .cloned()
            .unwrap_or_else(|| DEFAULT_KMS_CONFIG_PATH.to_string());

        let token_lifetime_seconds =
            parse_var(vars, "TOKEN_LIFETIME_SECONDS", DEFAULT_TOKEN_LIFETIME_SECONDS)?;
        require_positive("TOKEN_LIFETIME_SECONDS", token_lifetime_seconds)?;

        let clock_skew_seconds =
            parse_var(vars, "CLOCK_SKEW_SECONDS", DEFAULT_CLOCK_SKEW_SECONDS)?;
        let max_skew = i64::try_from(MAX_CLOCK_SKEW.as_secs()).unwrap_or(i64::MAX);
        if !(0..=max_skew).contains(&clock_skew_seconds) {
            return Err(ConfigError::InvalidValue {
                name: "CLOCK_SKEW_SECONDS".to_string(),
                reason: format!("must be between 0 and {max_skew}, got {clock_skew_seconds}"),
            });
        }

        let jwks_lifetime_hours =
            parse_var(vars, "JWKS_LIFETIME_HOURS", DEFAULT_JWKS_LIFETIME_HOURS)?;
        require_positive("JWKS_LIFETIME_HOURS", jwks_lifetime_hours)?;

        let jwks_skew_seconds = parse_var(vars, "JWKS_SKEW_SECONDS", DEFAULT_JWKS_SKEW_SECONDS)?;
        if jwks_skew_seconds < 0 {
            return Err(ConfigError::InvalidValue {
                name: "JWKS_SKEW_SECONDS".to_string(),
                reason: format!("must not be negative, got {jwks_skew_seconds}"),
            });
        }

        let destination_cache_ttl_seconds = parse_var(
            vars,
            "DESTINATION_CACHE_TTL_SECONDS",
            DEFAULT_DESTINATION_CACHE_TTL_SECONDS,
        )?;
        require_positive("DESTINATION_CACHE_TTL_SECONDS", destination_cache_ttl_seconds)?;

        let recipient_keys_cache_ttl_seconds = parse_var(
            vars,
            "RECIPIENT_KEYS_CACHE_TTL_SECONDS",
            DEFAULT_RECIPIENT_KEYS_CACHE_TTL_SECONDS,
        )?;
        require_positive(
            "RECIPIENT_KEYS_CACHE_TTL_SECONDS",
            recipient_keys_cache_ttl_seconds,
        )?;

        let custodian_timeout_ms =
            parse_var(vars, "CUSTODIAN_TIMEOUT_MS", DEFAULT_CUSTODIAN_TIMEOUT_MS)?;
        require_nonzero("CUSTODIAN_TIMEOUT_MS", custodian_timeout_ms)?;

        let key_set_fetch_timeout_ms = parse_var(
            vars,
            "KEY_SET_FETCH_TIMEOUT_MS",
            DEFAULT_KEY_SET_FETCH_TIMEOUT_MS,
        )?;
        require_nonzero("KEY_SET_FETCH_TIMEOUT_MS", key_set_fetch_timeout_ms)?;

        let request_timeout_seconds = parse_var(
            vars,
            "REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
        )?;
        require_nonzero("REQUEST_TIMEOUT_SECONDS", request_timeout_seconds)?;

        let log_format = match vars.get("LOG_FORMAT") {
            Some(value) => LogFormat::parse(value).ok_or_else(|| ConfigError::InvalidValue {
                name: "LOG_FORMAT".to_string(),
                reason: format!("expected 'pretty' or 'json', got '{value}'"),
            })?,
            None => LogFormat::default(),
        };

        Ok(Config {
            bind_address,
            kms_config_path,
            token_lifetime_seconds,
            clock_skew_seconds,
            jwks_lifetime_hours,
            jwks_skew_seconds,
            destination_cache_ttl_seconds,
            recipient_keys_cache_ttl_seconds,
            custodian_timeout_ms,
            key_set_fetch_timeout_ms,
            request_timeout_seconds,
            observability: ObservabilityConfig::new(DEFAULT_LOG_FILTER, log_format),
        })
    }
}

fn parse_var<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                name: name.to_string(),
                reason: format!("must be a valid integer, got '{value}': {e}"),
            }),
        None => Ok(default),
    }
}

fn require_positive(name: &str, value: i64) -> Result<(), ConfigError> {
    if value <= 0 {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("must be positive, got {value}"),
        });
    }
    Ok(())
}

fn require_nonzero(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Key schedule file
// =============================================================================

/// One configured key: custodian identifier and activation instant.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyEntryConfig {
    pub key_id: String,
    pub use_from: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyGroupsConfig {
    #[serde(default)]
    pub jwt: Vec<KeyEntryConfig>,
    #[serde(default)]
    pub jose: Vec<KeyEntryConfig>,
    #[serde(default)]
    pub jwks: Vec<KeyEntryConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpiresPolicyConfig {
    #[serde(default)]
    pub overlap_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    pub audience: String,
    pub kid: String,
    pub jwks_url: String,
}

/// Parsed form of the YAML key schedule.
///
/// ```yaml
/// issuer: https://auth.example.com
/// expires_policy:
///   overlap_days: 180
/// keys:
///   jwt:
///     - key_id: alias/jwt-2024
///       use_from: 2024-01-01T00:00:00Z
/// destinations:
///   partnerA:
///     audience: https://partner-a.example/api
///     kid: partner-a-enc-1
///     jwks_url: https://partner-a.example/.well-known/jwks.json
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct KeyScheduleFile {
    pub issuer: String,
    pub keys: KeyGroupsConfig,
    #[serde(default)]
    pub expires_policy: ExpiresPolicyConfig,
    #[serde(default)]
    pub destinations: BTreeMap<String, DestinationConfig>,
}

impl KeyScheduleFile {
    /// Reads and parses the schedule at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::ScheduleRead {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_yaml_str(&contents)
    }

    /// Parses a schedule from YAML text and checks it is usable.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: KeyScheduleFile =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ScheduleParse(e.to_string()))?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::InvalidSchedule(
                "issuer must not be empty".to_string(),
            ));
        }

        for (reference, destination) in &self.destinations {
            if destination.audience.trim().is_empty()
                || destination.kid.trim().is_empty()
                || destination.jwks_url.trim().is_empty()
            {
                return Err(ConfigError::InvalidSchedule(format!(
                    "destination {reference} needs audience, kid and jwks_url"
                )));
            }
        }

        self.key_schedule()
            .validate()
            .map_err(|e| ConfigError::InvalidSchedule(e.to_string()))
    }

    /// Key entries per group, before the expiration policy is applied.
    pub fn key_schedule(&self) -> KeySchedule {
        let entries = |configs: &[KeyEntryConfig]| -> Vec<KeyEntry> {
            configs
                .iter()
                .map(|c| KeyEntry::new(c.key_id.clone(), c.use_from))
                .collect()
        };

        KeySchedule {
            overlap_days: self.expires_policy.overlap_days,
            jwt: entries(&self.keys.jwt),
            jose: entries(&self.keys.jose),
            jwks: entries(&self.keys.jwks),
        }
    }

    /// Static destinations keyed by tenant reference.
    pub fn destinations(&self) -> HashMap<String, Destination> {
        self.destinations
            .iter()
            .map(|(reference, d)| {
                (
                    reference.clone(),
                    Destination {
                        audience: d.audience.clone(),
                        recipient_key_id: d.kid.clone(),
                        recipient_key_set_url: d.jwks_url.clone(),
                    },
                )
            })
            .collect()
    }

    /// Configured key identifiers of one group, in file order.
    pub fn key_ids(&self, group: KeyGroup) -> Vec<&str> {
        let configs = match group {
            KeyGroup::Jwt => &self.keys.jwt,
            KeyGroup::Jose => &self.keys.jose,
            KeyGroup::Jwks => &self.keys.jwks,
        };
        configs.iter().map(|c| c.key_id.as_str()).collect()
    }
}
