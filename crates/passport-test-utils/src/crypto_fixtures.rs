//! Fixed cryptographic material for testing
//!
//! RSA generation is slow, so RSA keys are checked-in PKCS#8 fixtures. EC
//! keys are derived from seeds by the mock custodian.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use passport_service::services::recipient_keys::{RecipientKey, RecipientKeyMaterial};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey};
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;

const RSA_2048_A: &str = include_str!("../fixtures/rsa-2048-a.pem");
const RSA_2048_B: &str = include_str!("../fixtures/rsa-2048-b.pem");
const RSA_3072: &str = include_str!("../fixtures/rsa-3072.pem");

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("Malformed token: {0}")]
    Token(String),
}

/// Checked-in RSA keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaFixture {
    /// 2048-bit, used for signing.
    A2048,
    /// 2048-bit, used as a recipient encryption key.
    B2048,
    /// 3072-bit, used for the `jose` group.
    C3072,
}

impl RsaFixture {
    pub fn pem(self) -> &'static str {
        match self {
            RsaFixture::A2048 => RSA_2048_A,
            RsaFixture::B2048 => RSA_2048_B,
            RsaFixture::C3072 => RSA_3072,
        }
    }
}

/// Loads an RSA fixture.
pub fn rsa_private_key(fixture: RsaFixture) -> Result<RsaPrivateKey, FixtureError> {
    RsaPrivateKey::from_pkcs8_pem(fixture.pem())
        .map_err(|e| FixtureError::Crypto(format!("Failed to parse RSA fixture: {e}")))
}

/// The public JWK a recipient would publish for `key`.
pub fn recipient_jwk(key: &RsaPrivateKey, kid: &str) -> serde_json::Value {
    serde_json::json!({
        "kty": "RSA",
        "kid": kid,
        "use": "enc",
        "alg": "RSA-OAEP-256",
        "n": URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
        "e": URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
    })
}

/// The parsed form of [`recipient_jwk`].
pub fn recipient_key(key: &RsaPrivateKey, kid: &str) -> RecipientKey {
    RecipientKey {
        kid: kid.to_string(),
        alg: Some("RSA-OAEP-256".to_string()),
        material: RecipientKeyMaterial::Rsa {
            n: key.n().to_bytes_be(),
            e: key.e().to_bytes_be(),
        },
    }
}

fn segment(token: &str, index: usize) -> Result<Vec<u8>, FixtureError> {
    let part = token
        .split('.')
        .nth(index)
        .ok_or_else(|| FixtureError::Token(format!("missing segment {index}")))?;
    URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|e| FixtureError::Token(format!("segment {index}: {e}")))
}

/// Decrypts a compact RSA-OAEP(-256) / A256GCM JWE with the recipient key.
///
/// The OAEP digest follows the token's `alg` header.
pub fn decrypt_jwe(key: &RsaPrivateKey, token: &str) -> Result<Vec<u8>, FixtureError> {
    if token.split('.').count() != 5 {
        return Err(FixtureError::Token("JWE must have 5 parts".to_string()));
    }
    let header_b64 = token.split('.').next().unwrap_or_default();

    let header: serde_json::Value = serde_json::from_slice(&segment(token, 0)?)
        .map_err(|e| FixtureError::Token(format!("header: {e}")))?;
    let padding = match header["alg"].as_str() {
        Some("RSA-OAEP") => Oaep::new::<Sha1>(),
        _ => Oaep::new::<Sha256>(),
    };

    let cek = key
        .decrypt(padding, &segment(token, 1)?)
        .map_err(|e| FixtureError::Crypto(format!("Failed to unwrap content key: {e}")))?;
    let iv = segment(token, 2)?;
    let mut in_out = segment(token, 3)?;
    in_out.extend(segment(token, 4)?);

    let opening = LessSafeKey::new(
        UnboundKey::new(&AES_256_GCM, &cek)
            .map_err(|_| FixtureError::Crypto("invalid content key".to_string()))?,
    );
    let nonce = Nonce::try_assume_unique_for_key(&iv)
        .map_err(|_| FixtureError::Crypto("invalid IV".to_string()))?;
    let plaintext = opening
        .open_in_place(nonce, Aad::from(header_b64.as_bytes()), &mut in_out)
        .map_err(|_| FixtureError::Crypto("content decryption failed".to_string()))?;
    Ok(plaintext.to_vec())
}
