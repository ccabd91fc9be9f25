//! AWS KMS custodian.
//!
//! Signing inputs are hashed locally and sent with `MessageType::Digest`, so
//! the 4KB raw-message limit of the Sign API never applies.

use super::KeyCustodian;
use crate::errors::PassportError;
use crate::keys::{KeySpec, PublicKeyDescriptor, SigningMethod};
use aws_sdk_kms::error::DisplayErrorContext;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::{MessageType, SigningAlgorithmSpec};
use aws_sdk_kms::Client;
use tracing::instrument;

pub struct KmsCustodian {
    client: Client,
}

impl KmsCustodian {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the standard AWS environment (region, credentials
    /// chain, endpoint overrides).
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

fn signing_algorithm(method: SigningMethod) -> SigningAlgorithmSpec {
    match method {
        SigningMethod::Ps256 => SigningAlgorithmSpec::RsassaPssSha256,
        SigningMethod::Es256 => SigningAlgorithmSpec::EcdsaSha256,
        SigningMethod::Es384 => SigningAlgorithmSpec::EcdsaSha384,
        SigningMethod::Es512 => SigningAlgorithmSpec::EcdsaSha512,
    }
}

#[async_trait::async_trait]
impl KeyCustodian for KmsCustodian {
    #[instrument(skip_all)]
    async fn public_key(&self, key_id: &str) -> Result<PublicKeyDescriptor, PassportError> {
        let output = self
            .client
            .get_public_key()
            .key_id(key_id)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    target: "passport.custodian",
                    error = %DisplayErrorContext(&e),
                    "KMS GetPublicKey failed"
                );
                PassportError::Custodian(format!("GetPublicKey failed: {}", DisplayErrorContext(&e)))
            })?;

        let der = output
            .public_key()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| {
                PassportError::Custodian("GetPublicKey returned no public key".to_string())
            })?;

        let key_spec = output
            .key_spec()
            .map(|spec| KeySpec::from_name(spec.as_str()))
            .unwrap_or_else(|| KeySpec::Other("UNKNOWN".to_string()));

        Ok(PublicKeyDescriptor {
            key_id: output.key_id().unwrap_or(key_id).to_string(),
            key_spec,
            der,
        })
    }

    #[instrument(skip_all, fields(alg = %method))]
    async fn sign(
        &self,
        key_id: &str,
        message: &[u8],
        method: SigningMethod,
    ) -> Result<Vec<u8>, PassportError> {
        let output = self
            .client
            .sign()
            .key_id(key_id)
            .message(Blob::new(method.digest(message)))
            .message_type(MessageType::Digest)
            .signing_algorithm(signing_algorithm(method))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    target: "passport.custodian",
                    error = %DisplayErrorContext(&e),
                    "KMS Sign failed"
                );
                PassportError::Custodian(format!("Sign failed: {}", DisplayErrorContext(&e)))
            })?;

        output
            .signature()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| PassportError::Custodian("Sign returned no signature".to_string()))
    }
}
