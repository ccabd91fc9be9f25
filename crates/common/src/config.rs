//! Common configuration types for Passport components.

use serde::{Deserialize, Serialize};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-field output.
    #[default]
    Pretty,
    /// One JSON object per event, for log shippers.
    Json,
}

impl LogFormat {
    /// Parses a `LOG_FORMAT` value. Unknown values yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default `EnvFilter` directive, used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Output format for the tracing subscriber
    pub log_format: LogFormat,
}

impl ObservabilityConfig {
    /// Builds a config with the given default filter and format.
    pub fn new(log_filter: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            log_filter: log_filter.into(),
            log_format,
        }
    }

    /// Whether events should be emitted as JSON.
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format == LogFormat::Json
    }
}
