//! Key custodian seam.
//!
//! The custodian owns every private key. Passport only ever asks it for a
//! public key or for a signature over a message; private key material never
//! crosses this boundary.
//!
//! - [`kms::KmsCustodian`] talks to AWS KMS
//! - [`mock::MockCustodian`] signs locally with in-memory keys (tests, local runs)

pub mod kms;
pub mod mock;

use crate::errors::PassportError;
use crate::keys::{PublicKeyDescriptor, SigningMethod};
use crate::observability::metrics;
use std::future::Future;
use std::time::{Duration, Instant};

/// External holder of private keys.
#[async_trait::async_trait]
pub trait KeyCustodian: Send + Sync {
    /// Fetches the public half and spec of `key_id`.
    async fn public_key(&self, key_id: &str) -> Result<PublicKeyDescriptor, PassportError>;

    /// Signs `message` with `key_id` using `method`.
    ///
    /// ECDSA signatures may come back DER-encoded.
    async fn sign(
        &self,
        key_id: &str,
        message: &[u8],
        method: SigningMethod,
    ) -> Result<Vec<u8>, PassportError>;
}

/// Runs a custodian call under `timeout`, recording its outcome.
pub async fn with_deadline<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, PassportError>
where
    F: Future<Output = Result<T, PassportError>>,
{
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                target: "passport.custodian",
                operation,
                timeout_ms = timeout.as_millis() as u64,
                "Custodian call timed out"
            );
            Err(PassportError::Timeout {
                operation: operation.to_string(),
            })
        }
    };

    let status = match &result {
        Ok(_) => "success",
        Err(PassportError::Timeout { .. }) => "timeout",
        Err(_) => "error",
    };
    metrics::record_custodian_call(operation, status, start.elapsed());

    result
}
