//! Passport error types.
//!
//! One enum covers the engine and the HTTP host. Every variant maps to an
//! HTTP status via `IntoResponse`; messages returned to clients are generic
//! and never carry key material, custodian key identifiers, or tenant
//! references. Details are logged server-side.

use crate::keys::KeyGroup;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PassportError {
    /// Malformed schedule, unmappable key family at load, or a key used for
    /// something its spec cannot do.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No entry in the group has `use_from <= now`.
    #[error("No active key in group {group}")]
    NoActiveKey { group: KeyGroup },

    /// Key family or curve we cannot publish or use.
    #[error("Configured key not supported: {0}")]
    UnsupportedKeyType(String),

    /// Public key bytes could not be parsed.
    #[error("Invalid key: {0}")]
    KeyDecode(String),

    /// Delegated signing failed or returned malformed output.
    #[error("Could not sign with {group} key {kid}: {reason}")]
    Signing {
        group: KeyGroup,
        kid: String,
        reason: String,
    },

    /// Encryption for a recipient failed.
    #[error("Could not encrypt for recipient key {kid}: {reason}")]
    Encryption { kid: String, reason: String },

    /// The destination source has no entry for the reference.
    #[error("Destination not found")]
    DestinationNotFound { reference: String },

    /// The destination source failed for the reference.
    #[error("Destination lookup failed: {source}")]
    DestinationLookup {
        reference: String,
        #[source]
        source: Box<PassportError>,
    },

    /// Token emission could not resolve its destination.
    #[error("Destination resolution failed: {0}")]
    DestinationResolution(#[source] Box<PassportError>),

    /// Recipient key set unreachable, unparsable, or missing the `kid`.
    #[error("Recipient key unavailable: {0}")]
    RecipientKey(String),

    /// Opaque failure from the key custodian.
    #[error("Key custodian error: {0}")]
    Custodian(String),

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PassportError {
    /// Whether the root cause is a missing destination.
    pub fn is_destination_not_found(&self) -> bool {
        match self {
            PassportError::DestinationNotFound { .. } => true,
            PassportError::DestinationLookup { source, .. } => source.is_destination_not_found(),
            PassportError::DestinationResolution(inner) => inner.is_destination_not_found(),
            _ => false,
        }
    }

    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            PassportError::InvalidRequest(_) => 400,
            PassportError::DestinationNotFound { .. } => 404,
            PassportError::DestinationLookup { .. } | PassportError::DestinationResolution(_) => {
                if self.is_destination_not_found() {
                    404
                } else {
                    502
                }
            }
            PassportError::RecipientKey(_)
            | PassportError::Custodian(_)
            | PassportError::Signing { .. } => 502,
            PassportError::NoActiveKey { .. } => 503,
            PassportError::Timeout { .. } => 504,
            PassportError::Configuration(_)
            | PassportError::UnsupportedKeyType(_)
            | PassportError::KeyDecode(_)
            | PassportError::Encryption { .. }
            | PassportError::Internal(_) => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for PassportError {
    fn into_response(self) -> Response {
        let (code, message) = match &self {
            PassportError::InvalidRequest(reason) => ("INVALID_REQUEST", reason.clone()),
            PassportError::DestinationNotFound { .. } => (
                "DESTINATION_NOT_FOUND",
                "Unknown destination".to_string(),
            ),
            PassportError::DestinationLookup { .. } | PassportError::DestinationResolution(_)
                if self.is_destination_not_found() =>
            {
                ("DESTINATION_NOT_FOUND", "Unknown destination".to_string())
            }
            PassportError::DestinationLookup { .. } | PassportError::DestinationResolution(_) => {
                tracing::warn!(target: "passport.errors", error = %self, "Destination resolution failed");
                (
                    "DESTINATION_UNAVAILABLE",
                    "Destination could not be resolved".to_string(),
                )
            }
            PassportError::RecipientKey(reason) => {
                tracing::warn!(target: "passport.errors", reason = %reason, "Recipient key unavailable");
                (
                    "RECIPIENT_KEY_UNAVAILABLE",
                    "Recipient key could not be obtained".to_string(),
                )
            }
            PassportError::Custodian(reason) => {
                tracing::error!(target: "passport.errors", reason = %reason, "Key custodian failure");
                (
                    "KEY_CUSTODIAN_ERROR",
                    "Key service unavailable".to_string(),
                )
            }
            PassportError::Signing { group, kid, reason } => {
                tracing::error!(target: "passport.errors", %group, kid = %kid, reason = %reason, "Signing failed");
                ("SIGNING_FAILED", "Token could not be signed".to_string())
            }
            PassportError::NoActiveKey { group } => {
                tracing::error!(target: "passport.errors", %group, "No active key");
                (
                    "NO_ACTIVE_KEY",
                    "No key is currently active".to_string(),
                )
            }
            PassportError::Timeout { operation } => {
                tracing::warn!(target: "passport.errors", operation = %operation, "Operation timed out");
                ("TIMEOUT", "Upstream operation timed out".to_string())
            }
            PassportError::Configuration(_)
            | PassportError::UnsupportedKeyType(_)
            | PassportError::KeyDecode(_)
            | PassportError::Encryption { .. }
            | PassportError::Internal(_) => {
                tracing::error!(target: "passport.errors", error = %self, "Internal failure");
                ("INTERNAL_ERROR", "An internal error occurred".to_string())
            }
        };

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}
