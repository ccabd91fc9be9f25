//! One custodian-held key.
//!
//! A [`KeyHandle`] never holds private key material. It carries the key's
//! schedule entry, the public key fetched once at load time, and a reference
//! to the custodian that performs signatures on its behalf.

use crate::crypto::{self, DecodedPublicKey};
use crate::custodian::{with_deadline, KeyCustodian};
use crate::errors::PassportError;
use crate::keys::schedule::{KeyEntry, Scheduled};
use crate::keys::KeyGroup;
use common::jose::encode_segment;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Length of the derived `kid`.
pub const KID_LENGTH: usize = 32;

/// Custodian key spec, as reported by the custodian.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySpec {
    Rsa2048,
    Rsa3072,
    Rsa4096,
    EccNistP256,
    EccNistP384,
    EccNistP521,
    /// Anything else (symmetric, HMAC, secp256k1, ...).
    Other(String),
}

impl KeySpec {
    /// Maps a custodian spec name (`RSA_2048`, `ECC_NIST_P256`, ...).
    pub fn from_name(name: &str) -> Self {
        match name {
            "RSA_2048" => KeySpec::Rsa2048,
            "RSA_3072" => KeySpec::Rsa3072,
            "RSA_4096" => KeySpec::Rsa4096,
            "ECC_NIST_P256" => KeySpec::EccNistP256,
            "ECC_NIST_P384" => KeySpec::EccNistP384,
            "ECC_NIST_P521" => KeySpec::EccNistP521,
            other => KeySpec::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KeySpec::Rsa2048 => "RSA_2048",
            KeySpec::Rsa3072 => "RSA_3072",
            KeySpec::Rsa4096 => "RSA_4096",
            KeySpec::EccNistP256 => "ECC_NIST_P256",
            KeySpec::EccNistP384 => "ECC_NIST_P384",
            KeySpec::EccNistP521 => "ECC_NIST_P521",
            KeySpec::Other(name) => name,
        }
    }

    pub fn is_rsa(&self) -> bool {
        matches!(self, KeySpec::Rsa2048 | KeySpec::Rsa3072 | KeySpec::Rsa4096)
    }

    pub fn is_ec(&self) -> bool {
        matches!(
            self,
            KeySpec::EccNistP256 | KeySpec::EccNistP384 | KeySpec::EccNistP521
        )
    }

    /// RSA signs with PS256; NIST curves with the matching ECDSA variant.
    pub fn signing_method(&self) -> Option<SigningMethod> {
        match self {
            KeySpec::Rsa2048 | KeySpec::Rsa3072 | KeySpec::Rsa4096 => Some(SigningMethod::Ps256),
            KeySpec::EccNistP256 => Some(SigningMethod::Es256),
            KeySpec::EccNistP384 => Some(SigningMethod::Es384),
            KeySpec::EccNistP521 => Some(SigningMethod::Es512),
            KeySpec::Other(_) => None,
        }
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWS signing method of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningMethod {
    Ps256,
    Es256,
    Es384,
    Es512,
}

impl SigningMethod {
    /// JWS `alg` header value.
    pub fn jws_alg(self) -> &'static str {
        match self {
            SigningMethod::Ps256 => "PS256",
            SigningMethod::Es256 => "ES256",
            SigningMethod::Es384 => "ES384",
            SigningMethod::Es512 => "ES512",
        }
    }

    /// Custodian signing algorithm name.
    pub fn custodian_algorithm(self) -> &'static str {
        match self {
            SigningMethod::Ps256 => "RSASSA_PSS_SHA_256",
            SigningMethod::Es256 => "ECDSA_SHA_256",
            SigningMethod::Es384 => "ECDSA_SHA_384",
            SigningMethod::Es512 => "ECDSA_SHA_512",
        }
    }

    /// Message digest the algorithm signs over.
    pub fn digest(self, message: &[u8]) -> Vec<u8> {
        match self {
            SigningMethod::Ps256 | SigningMethod::Es256 => Sha256::digest(message).to_vec(),
            SigningMethod::Es384 => Sha384::digest(message).to_vec(),
            SigningMethod::Es512 => Sha512::digest(message).to_vec(),
        }
    }
}

impl fmt::Display for SigningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.jws_alg())
    }
}

/// Public half of a custodian key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyDescriptor {
    /// Canonical custodian identifier (for KMS, the key ARN).
    pub key_id: String,
    pub key_spec: KeySpec,
    /// DER-encoded SubjectPublicKeyInfo.
    pub der: Vec<u8>,
}

/// First [`KID_LENGTH`] characters of base64url(SHA-256(`key_id`)).
pub fn derive_kid(key_id: &str) -> String {
    encode_segment(&Sha256::digest(key_id.as_bytes()))
        .chars()
        .take(KID_LENGTH)
        .collect()
}

/// A scheduled, custodian-backed key. Immutable after construction.
#[derive(Clone)]
pub struct KeyHandle {
    group: KeyGroup,
    entry: KeyEntry,
    descriptor: PublicKeyDescriptor,
    kid: String,
    custodian: Arc<dyn KeyCustodian>,
    timeout: Duration,
}

impl KeyHandle {
    pub fn new(
        group: KeyGroup,
        entry: KeyEntry,
        descriptor: PublicKeyDescriptor,
        custodian: Arc<dyn KeyCustodian>,
        timeout: Duration,
    ) -> Self {
        let kid = derive_kid(&descriptor.key_id);
        Self {
            group,
            entry,
            descriptor,
            kid,
            custodian,
            timeout,
        }
    }

    /// Fetches the public key for `entry` and wraps it.
    #[instrument(skip_all, fields(group = %group))]
    pub async fn load(
        group: KeyGroup,
        entry: KeyEntry,
        custodian: Arc<dyn KeyCustodian>,
        timeout: Duration,
    ) -> Result<Self, PassportError> {
        let descriptor = with_deadline(
            "custodian.public_key",
            timeout,
            custodian.public_key(&entry.key_id),
        )
        .await?;

        Ok(Self::new(group, entry, descriptor, custodian, timeout))
    }

    pub fn group(&self) -> KeyGroup {
        self.group
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Canonical custodian identifier the public key was fetched under.
    pub fn custodian_key_id(&self) -> &str {
        &self.descriptor.key_id
    }

    pub fn key_spec(&self) -> &KeySpec {
        &self.descriptor.key_spec
    }

    pub fn public_key_der(&self) -> &[u8] {
        &self.descriptor.der
    }

    pub fn public_key_pem(&self) -> String {
        crypto::pem_armor(&self.descriptor.der)
    }

    pub fn decode_public_key(&self) -> Result<DecodedPublicKey, PassportError> {
        crypto::decode_public_key(&self.descriptor.der)
    }

    /// The key's signing method; a key without one cannot sign.
    pub fn signing_method(&self) -> Result<SigningMethod, PassportError> {
        self.descriptor.key_spec.signing_method().ok_or_else(|| {
            PassportError::Configuration(format!(
                "{} key {} has spec {} which cannot sign",
                self.group, self.kid, self.descriptor.key_spec
            ))
        })
    }

    /// Signs `message` through the custodian. The result is whatever the
    /// custodian returns (DER for ECDSA).
    #[instrument(skip_all, fields(group = %self.group, kid = %self.kid))]
    pub async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, PassportError> {
        let method = self.signing_method()?;

        let signature = with_deadline(
            "custodian.sign",
            self.timeout,
            self.custodian.sign(&self.descriptor.key_id, message, method),
        )
        .await
        .map_err(|e| match e {
            PassportError::Timeout { .. } => e,
            other => PassportError::Signing {
                group: self.group,
                kid: self.kid.clone(),
                reason: other.to_string(),
            },
        })?;

        if signature.is_empty() {
            return Err(PassportError::Signing {
                group: self.group,
                kid: self.kid.clone(),
                reason: "custodian returned an empty signature".to_string(),
            });
        }

        Ok(signature)
    }
}

impl Scheduled for KeyHandle {
    fn entry(&self) -> &KeyEntry {
        &self.entry
    }
}

/// Custodian identifiers stay out of Debug output.
impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("group", &self.group)
            .field("kid", &self.kid)
            .field("key_spec", &self.descriptor.key_spec)
            .field("use_from", &self.entry.use_from)
            .field("expires_at", &self.entry.expires_at)
            .finish_non_exhaustive()
    }
}
