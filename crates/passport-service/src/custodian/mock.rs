//! In-memory custodian for tests and local development.
//!
//! Signs with real keys so issued tokens verify, and returns ECDSA
//! signatures DER-encoded the way KMS does.

use super::KeyCustodian;
use crate::errors::PassportError;
use crate::keys::{KeySpec, PublicKeyDescriptor, SigningMethod};
use rsa::pkcs8::EncodePublicKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

enum MockKey {
    Rsa(Box<RsaPrivateKey>),
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    /// Public material only; signing fails.
    Raw { spec: KeySpec, der: Vec<u8> },
}

/// Mock custodian holding private keys in memory.
#[derive(Default)]
pub struct MockCustodian {
    keys: HashMap<String, MockKey>,
    public_key_calls: AtomicUsize,
    sign_calls: AtomicUsize,
    failing: AtomicBool,
    sign_delay: Option<Duration>,
    fixed_signature: Option<Vec<u8>>,
}

/// 32/48-byte scalar that is non-zero and below every NIST curve order.
fn seed_scalar<const N: usize>(seed: u8) -> [u8; N] {
    let mut bytes = [0u8; N];
    if let Some(first) = bytes.first_mut() {
        *first = 0x01;
    }
    if let Some(last) = bytes.last_mut() {
        *last = seed;
    }
    bytes
}

impl MockCustodian {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rsa_key(mut self, key_id: impl Into<String>, key: RsaPrivateKey) -> Self {
        self.keys.insert(key_id.into(), MockKey::Rsa(Box::new(key)));
        self
    }

    pub fn with_p256_key(mut self, key_id: impl Into<String>, key: p256::ecdsa::SigningKey) -> Self {
        self.keys.insert(key_id.into(), MockKey::P256(key));
        self
    }

    pub fn with_p384_key(mut self, key_id: impl Into<String>, key: p384::ecdsa::SigningKey) -> Self {
        self.keys.insert(key_id.into(), MockKey::P384(key));
        self
    }

    /// Deterministic P-256 key derived from `seed`.
    pub fn with_p256_seed(self, key_id: impl Into<String>, seed: u8) -> Self {
        match p256::ecdsa::SigningKey::from_slice(&seed_scalar::<32>(seed)) {
            Ok(key) => self.with_p256_key(key_id, key),
            Err(_) => self,
        }
    }

    /// Deterministic P-384 key derived from `seed`.
    pub fn with_p384_seed(self, key_id: impl Into<String>, seed: u8) -> Self {
        match p384::ecdsa::SigningKey::from_slice(&seed_scalar::<48>(seed)) {
            Ok(key) => self.with_p384_key(key_id, key),
            Err(_) => self,
        }
    }

    /// A key that only has public material, e.g. an unsupported spec.
    pub fn with_raw_key(mut self, key_id: impl Into<String>, spec: KeySpec, der: Vec<u8>) -> Self {
        self.keys.insert(key_id.into(), MockKey::Raw { spec, der });
        self
    }

    /// Delays every sign call.
    pub fn with_sign_delay(mut self, delay: Duration) -> Self {
        self.sign_delay = Some(delay);
        self
    }

    /// Returns these bytes from every sign call instead of a real signature.
    pub fn with_fixed_signature(mut self, signature: Vec<u8>) -> Self {
        self.fixed_signature = Some(signature);
        self
    }

    /// Makes every subsequent call fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn public_key_calls(&self) -> usize {
        self.public_key_calls.load(Ordering::SeqCst)
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    fn key(&self, key_id: &str) -> Result<&MockKey, PassportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PassportError::Custodian("Mock custodian error".to_string()));
        }
        self.keys
            .get(key_id)
            .ok_or_else(|| PassportError::Custodian(format!("key {key_id} not found")))
    }
}

fn encode_error(e: impl std::fmt::Display) -> PassportError {
    PassportError::Custodian(format!("could not encode public key: {e}"))
}

fn rsa_spec(key: &RsaPrivateKey) -> KeySpec {
    match key.size() * 8 {
        2048 => KeySpec::Rsa2048,
        3072 => KeySpec::Rsa3072,
        4096 => KeySpec::Rsa4096,
        bits => KeySpec::Other(format!("RSA_{bits}")),
    }
}

fn method_mismatch(spec: &KeySpec, method: SigningMethod) -> PassportError {
    PassportError::Custodian(format!("{method} not supported by {spec} key"))
}

#[async_trait::async_trait]
impl KeyCustodian for MockCustodian {
    async fn public_key(&self, key_id: &str) -> Result<PublicKeyDescriptor, PassportError> {
        self.public_key_calls.fetch_add(1, Ordering::SeqCst);

        let (key_spec, der) = match self.key(key_id)? {
            MockKey::Rsa(key) => (
                rsa_spec(key),
                key.to_public_key()
                    .to_public_key_der()
                    .map_err(encode_error)?
                    .as_bytes()
                    .to_vec(),
            ),
            MockKey::P256(key) => (
                KeySpec::EccNistP256,
                p256::PublicKey::from(key.verifying_key())
                    .to_public_key_der()
                    .map_err(encode_error)?
                    .as_bytes()
                    .to_vec(),
            ),
            MockKey::P384(key) => (
                KeySpec::EccNistP384,
                p384::PublicKey::from(key.verifying_key())
                    .to_public_key_der()
                    .map_err(encode_error)?
                    .as_bytes()
                    .to_vec(),
            ),
            MockKey::Raw { spec, der } => (spec.clone(), der.clone()),
        };

        Ok(PublicKeyDescriptor {
            key_id: key_id.to_string(),
            key_spec,
            der,
        })
    }

    async fn sign(
        &self,
        key_id: &str,
        message: &[u8],
        method: SigningMethod,
    ) -> Result<Vec<u8>, PassportError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.sign_delay {
            tokio::time::sleep(delay).await;
        }

        let key = self.key(key_id)?;

        if let Some(signature) = &self.fixed_signature {
            return Ok(signature.clone());
        }

        match (key, method) {
            (MockKey::Rsa(key), SigningMethod::Ps256) => {
                let signer = rsa::pss::BlindedSigningKey::<Sha256>::new(key.as_ref().clone());
                let signature = signer.sign_with_rng(&mut rand::thread_rng(), message);
                Ok(signature.to_vec())
            }
            (MockKey::P256(key), SigningMethod::Es256) => {
                let signature: p256::ecdsa::Signature =
                    p256::ecdsa::signature::Signer::sign(key, message);
                Ok(signature.to_der().as_bytes().to_vec())
            }
            (MockKey::P384(key), SigningMethod::Es384) => {
                let signature: p384::ecdsa::Signature =
                    p384::ecdsa::signature::Signer::sign(key, message);
                Ok(signature.to_der().as_bytes().to_vec())
            }
            (MockKey::Rsa(key), method) => Err(method_mismatch(&rsa_spec(key), method)),
            (MockKey::P256(_), method) => Err(method_mismatch(&KeySpec::EccNistP256, method)),
            (MockKey::P384(_), method) => Err(method_mismatch(&KeySpec::EccNistP384, method)),
            (MockKey::Raw { spec, .. }, method) => Err(method_mismatch(spec, method)),
        }
    }
}
