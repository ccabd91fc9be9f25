//! Observability for Passport.
//!
//! All instrumentation uses `#[instrument(skip_all)]` with explicitly chosen
//! fields. Keys are identified by their short `kid`; custodian key
//! identifiers never appear in logs. Destination references are tenant
//! data and are logged only through [`hash_for_correlation`].

pub mod metrics;

use crate::errors::PassportError;
use sha2::{Digest, Sha256};

/// Hash a field value for correlation in logs (SHA-256, first 8 hex chars)
pub fn hash_for_correlation(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(digest.get(..4).unwrap_or_default())
}

/// Error categories for metrics labels (bounded cardinality)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Schedule or key usage misconfigured, including no active key
    Configuration,
    /// Key decoding, unsupported families, signing and encryption
    Cryptographic,
    /// Destination or recipient key resolution
    Destination,
    /// Custodian failures and timeouts
    Upstream,
    /// Rejected caller input
    Request,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Cryptographic => "cryptographic",
            ErrorCategory::Destination => "destination",
            ErrorCategory::Upstream => "upstream",
            ErrorCategory::Request => "request",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl From<&PassportError> for ErrorCategory {
    fn from(err: &PassportError) -> Self {
        match err {
            PassportError::Configuration(_) | PassportError::NoActiveKey { .. } => {
                ErrorCategory::Configuration
            }
            PassportError::UnsupportedKeyType(_)
            | PassportError::KeyDecode(_)
            | PassportError::Signing { .. }
            | PassportError::Encryption { .. } => ErrorCategory::Cryptographic,
            PassportError::DestinationNotFound { .. }
            | PassportError::DestinationLookup { .. }
            | PassportError::DestinationResolution(_)
            | PassportError::RecipientKey(_) => ErrorCategory::Destination,
            PassportError::Custodian(_) | PassportError::Timeout { .. } => ErrorCategory::Upstream,
            PassportError::InvalidRequest(_) => ErrorCategory::Request,
            PassportError::Internal(_) => ErrorCategory::Internal,
        }
    }
}

/// `success`, or the error's category.
pub fn outcome_label<T>(result: &Result<T, PassportError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => ErrorCategory::from(e).as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyGroup;

    #[test]
    fn test_hash_for_correlation_consistency() {
        assert_eq!(
            hash_for_correlation("tenant-a"),
            hash_for_correlation("tenant-a")
        );
        assert_ne!(
            hash_for_correlation("tenant-a"),
            hash_for_correlation("tenant-b")
        );
    }

    #[test]
    fn test_hash_for_correlation_length() {
        let hash = hash_for_correlation("any-value");
        assert_eq!(hash.len(), 8, "Hash should be 8 hex characters");
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_error_category_mapping() {
        assert_eq!(
            ErrorCategory::from(&PassportError::NoActiveKey {
                group: KeyGroup::Jwt
            }),
            ErrorCategory::Configuration
        );
        assert_eq!(
            ErrorCategory::from(&PassportError::KeyDecode("x".into())),
            ErrorCategory::Cryptographic
        );
        assert_eq!(
            ErrorCategory::from(&PassportError::DestinationResolution(Box::new(
                PassportError::DestinationNotFound {
                    reference: "r".into()
                }
            ))),
            ErrorCategory::Destination
        );
        assert_eq!(
            ErrorCategory::from(&PassportError::Timeout {
                operation: "custodian.sign".into()
            }),
            ErrorCategory::Upstream
        );
        assert_eq!(
            ErrorCategory::from(&PassportError::InvalidRequest("x".into())),
            ErrorCategory::Request
        );
    }

    #[test]
    fn test_outcome_label() {
        assert_eq!(outcome_label::<()>(&Ok(())), "success");
        assert_eq!(
            outcome_label::<()>(&Err(PassportError::Internal("x".into()))),
            "internal"
        );
    }
}
