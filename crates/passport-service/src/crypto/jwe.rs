//! Compact JWE encryption for a recipient's public key.
//!
//! Key management is RSA-OAEP or RSA-OAEP-256, chosen by the recipient
//! key's `alg` (RSA-OAEP-256 when absent); content encryption is A256GCM
//! with the encoded protected header as additional authenticated data.

use super::generate_random_bytes;
use crate::errors::PassportError;
use crate::services::recipient_keys::{RecipientKey, RecipientKeyMaterial};
use common::jose::{encode_json_segment, encode_segment};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use rsa::{BigUint, Oaep, RsaPublicKey};
use serde::Serialize;
use sha1::Sha1;
use sha2::Sha256;

/// Key wrap used when the recipient key names none.
pub const KEY_MANAGEMENT_ALG: &str = "RSA-OAEP-256";
pub const CONTENT_ENCRYPTION_ALG: &str = "A256GCM";

/// RSA key wrap algorithms a recipient may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWrap {
    /// `RSA-OAEP`: OAEP with SHA-1 and MGF1-SHA-1.
    RsaOaep,
    /// `RSA-OAEP-256`: OAEP with SHA-256 and MGF1-SHA-256.
    RsaOaep256,
}

impl KeyWrap {
    /// Key wrap named by a recipient JWK `alg`.
    pub fn for_recipient(recipient: &RecipientKey) -> Result<Self, PassportError> {
        match recipient.alg.as_deref() {
            None | Some("RSA-OAEP-256") => Ok(KeyWrap::RsaOaep256),
            Some("RSA-OAEP") => Ok(KeyWrap::RsaOaep),
            Some(other) => Err(PassportError::UnsupportedKeyType(format!(
                "recipient key {} asks for unsupported key wrap {other}",
                recipient.kid
            ))),
        }
    }

    pub fn jwe_alg(self) -> &'static str {
        match self {
            KeyWrap::RsaOaep => "RSA-OAEP",
            KeyWrap::RsaOaep256 => "RSA-OAEP-256",
        }
    }

    fn padding(self) -> Oaep {
        match self {
            KeyWrap::RsaOaep => Oaep::new::<Sha1>(),
            KeyWrap::RsaOaep256 => Oaep::new::<Sha256>(),
        }
    }
}

const CEK_BYTES: usize = 32;
const IV_BYTES: usize = 12;

#[derive(Debug, Serialize)]
struct JweHeader<'a> {
    alg: &'static str,
    enc: &'static str,
    cty: &'static str,
    kid: &'a str,
}

/// Encrypts a payload so only the holder of the recipient key can read it.
pub trait Encryptor: Send + Sync {
    /// Returns compact JWE serialization.
    fn encrypt(&self, plaintext: &[u8], recipient: &RecipientKey) -> Result<String, PassportError>;
}

/// RSA-OAEP(-256) / A256GCM encryptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct JweEncryptor;

impl JweEncryptor {
    pub fn new() -> Self {
        Self
    }
}

impl Encryptor for JweEncryptor {
    fn encrypt(&self, plaintext: &[u8], recipient: &RecipientKey) -> Result<String, PassportError> {
        let public_key = match &recipient.material {
            RecipientKeyMaterial::Rsa { n, e } => {
                RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e)).map_err(
                    |e| PassportError::Encryption {
                        kid: recipient.kid.clone(),
                        reason: format!("invalid RSA key: {e}"),
                    },
                )?
            }
            RecipientKeyMaterial::Unsupported { kty } => {
                return Err(PassportError::UnsupportedKeyType(format!(
                    "recipient key type {kty} cannot wrap a content key"
                )));
            }
        };

        let wrap = KeyWrap::for_recipient(recipient)?;

        let failed = |reason: String| PassportError::Encryption {
            kid: recipient.kid.clone(),
            reason,
        };

        let header = JweHeader {
            alg: wrap.jwe_alg(),
            enc: CONTENT_ENCRYPTION_ALG,
            cty: "JWT",
            kid: &recipient.kid,
        };
        let header_b64 =
            encode_json_segment(&header).map_err(|e| failed(format!("header: {e}")))?;

        let cek = generate_random_bytes(CEK_BYTES)?;
        let iv = generate_random_bytes(IV_BYTES)?;

        let encrypted_key = public_key
            .encrypt(&mut rand::thread_rng(), wrap.padding(), &cek)
            .map_err(|e| failed(format!("key wrap: {e}")))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &cek)
            .map_err(|_| failed("invalid content key".to_string()))?;
        let sealing_key = LessSafeKey::new(unbound);
        let nonce = Nonce::try_assume_unique_for_key(&iv)
            .map_err(|_| failed("invalid IV".to_string()))?;

        let mut in_out = plaintext.to_vec();
        let tag = sealing_key
            .seal_in_place_separate_tag(nonce, Aad::from(header_b64.as_bytes()), &mut in_out)
            .map_err(|_| failed("content encryption failed".to_string()))?;

        Ok(format!(
            "{header_b64}.{}.{}.{}.{}",
            encode_segment(&encrypted_key),
            encode_segment(&iv),
            encode_segment(&in_out),
            encode_segment(tag.as_ref())
        ))
    }
}
