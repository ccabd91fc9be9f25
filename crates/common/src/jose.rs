//! JOSE compact serialization helpers shared across Passport crates.
//!
//! Covers the pieces every producer and consumer of compact JWS/JWE needs:
//! - base64url (no padding) segment encoding and decoding
//! - splitting a compact token into its dot-separated segments
//! - reading the protected header
//! - size limits checked before any decoding
//!
//! Cryptography lives elsewhere; nothing here signs, verifies, or decrypts.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jose::{decode_header, encode_json_segment, signing_input};
//!
//! let header = encode_json_segment(&serde_json::json!({"alg": "ES256", "kid": kid}))?;
//! let payload = encode_json_segment(&claims)?;
//! let input = signing_input(&header, &payload);
//!
//! assert_eq!(decode_header(&token)?["kid"], kid);
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted size of a compact token before any parsing (16KB).
///
/// Key-set envelopes carry every published key plus its PEM chain, so this is
/// larger than an ordinary access token limit.
pub const MAX_COMPACT_SIZE_BYTES: usize = 16 * 1024;

/// Number of segments in a compact JWS (`header.payload.signature`).
pub const JWS_SEGMENTS: usize = 3;

/// Number of segments in a compact JWE
/// (`header.encrypted_key.iv.ciphertext.tag`).
pub const JWE_SEGMENTS: usize = 5;

/// Maximum configurable clock skew (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while handling compact serializations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoseError {
    /// Token exceeds [`MAX_COMPACT_SIZE_BYTES`].
    #[error("Compact token exceeds maximum size")]
    TooLarge,

    /// Wrong segment count, bad base64, or a header that is not a JSON object.
    #[error("Compact token is malformed: {0}")]
    Malformed(String),

    /// A value could not be serialized to JSON.
    #[error("JSON serialization failed: {0}")]
    Serialization(String),
}

// =============================================================================
// Segment helpers
// =============================================================================

/// Encodes raw bytes as a base64url segment without padding.
#[must_use]
pub fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Serializes `value` to JSON and encodes it as a segment.
///
/// # Errors
///
/// Returns `JoseError::Serialization` if `value` cannot be serialized.
pub fn encode_json_segment<T: Serialize + ?Sized>(value: &T) -> Result<String, JoseError> {
    let json = serde_json::to_vec(value).map_err(|e| JoseError::Serialization(e.to_string()))?;
    Ok(encode_segment(&json))
}

/// Decodes a base64url (no padding) segment.
///
/// # Errors
///
/// Returns `JoseError::Malformed` for invalid base64url input.
pub fn decode_segment(segment: &str) -> Result<Vec<u8>, JoseError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| JoseError::Malformed(format!("invalid base64url segment: {e}")))
}

/// Builds the JWS signing input `BASE64URL(header) || '.' || BASE64URL(payload)`.
#[must_use]
pub fn signing_input(header_b64: &str, payload_b64: &str) -> String {
    format!("{header_b64}.{payload_b64}")
}

/// Splits a compact token into exactly `expected` segments.
///
/// # Errors
///
/// - `JoseError::TooLarge` if the token exceeds [`MAX_COMPACT_SIZE_BYTES`]
/// - `JoseError::Malformed` if the segment count differs from `expected`
pub fn split_compact(token: &str, expected: usize) -> Result<Vec<&str>, JoseError> {
    if token.len() > MAX_COMPACT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jose",
            token_size = token.len(),
            max_size = MAX_COMPACT_SIZE_BYTES,
            "Compact token rejected: size exceeds maximum allowed"
        );
        return Err(JoseError::TooLarge);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != expected {
        tracing::debug!(
            target: "common.jose",
            parts = parts.len(),
            expected,
            "Compact token rejected: wrong segment count"
        );
        return Err(JoseError::Malformed(format!(
            "expected {expected} segments, found {}",
            parts.len()
        )));
    }

    Ok(parts)
}

/// Decodes the protected header (first segment) of a compact JWS or JWE.
///
/// # Errors
///
/// Returns `JoseError::TooLarge` / `JoseError::Malformed` for oversized input,
/// undecodable base64, or a header that is not a JSON object.
pub fn decode_header(token: &str) -> Result<serde_json::Map<String, serde_json::Value>, JoseError> {
    if token.len() > MAX_COMPACT_SIZE_BYTES {
        return Err(JoseError::TooLarge);
    }

    let header_part = token
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| JoseError::Malformed("empty token".to_string()))?;

    let header_bytes = decode_segment(header_part)?;
    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jose", error = %e, "Failed to parse header JSON");
        JoseError::Malformed("header is not JSON".to_string())
    })?;

    match header {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(JoseError::Malformed("header is not a JSON object".to_string())),
    }
}
