//! Cryptographic helpers.
//!
//! Private keys never appear here: signatures come from the custodian and
//! encryption only needs the recipient's public key.
//!
//! - [`decode_public_key`] classifies a SubjectPublicKeyInfo
//! - [`jws`] assembles compact JWS around custodian signatures
//! - [`jwe`] encrypts a compact JWS for a recipient (RSA-OAEP-256 + A256GCM)

pub mod jwe;
pub mod jws;

use crate::errors::PassportError;
use base64::{engine::general_purpose::STANDARD, Engine};
use common::jose::encode_segment;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use ring::rand::{SecureRandom, SystemRandom};
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use spki::{ObjectIdentifier, SubjectPublicKeyInfoRef};
use tracing::instrument;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
const SECP521R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.35");

/// Bytes of randomness in a `jti`.
pub const JTI_BYTES: usize = 12;

/// NIST curves we publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    fn from_oid(oid: ObjectIdentifier) -> Option<Self> {
        if oid == SECP256R1 {
            Some(EcCurve::P256)
        } else if oid == SECP384R1 {
            Some(EcCurve::P384)
        } else if oid == SECP521R1 {
            Some(EcCurve::P521)
        } else {
            None
        }
    }

    /// JWK `crv`.
    pub fn crv(self) -> &'static str {
        match self {
            EcCurve::P256 => "P-256",
            EcCurve::P384 => "P-384",
            EcCurve::P521 => "P-521",
        }
    }

    /// JWS `alg` for ECDSA on this curve.
    pub fn jws_alg(self) -> &'static str {
        match self {
            EcCurve::P256 => "ES256",
            EcCurve::P384 => "ES384",
            EcCurve::P521 => "ES512",
        }
    }

    /// Byte length of one coordinate (and of `r` / `s`).
    pub fn coordinate_len(self) -> usize {
        match self {
            EcCurve::P256 => 32,
            EcCurve::P384 => 48,
            EcCurve::P521 => 66,
        }
    }
}

/// A public key classified by family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPublicKey {
    /// Big-endian unsigned modulus and exponent.
    Rsa { n: Vec<u8>, e: Vec<u8> },
    /// Affine coordinates, each [`EcCurve::coordinate_len`] bytes.
    Ec {
        curve: EcCurve,
        x: Vec<u8>,
        y: Vec<u8>,
    },
    /// Parsed, but not a family we can publish.
    Unsupported { algorithm: String },
}

/// Classifies a DER SubjectPublicKeyInfo.
///
/// Bytes that do not parse are `KeyDecode`. A well-formed key of a family or
/// curve we do not map decodes to [`DecodedPublicKey::Unsupported`].
pub fn decode_public_key(der: &[u8]) -> Result<DecodedPublicKey, PassportError> {
    let spki = SubjectPublicKeyInfoRef::try_from(der)
        .map_err(|e| PassportError::KeyDecode(format!("not a SubjectPublicKeyInfo: {e}")))?;

    let algorithm = spki.algorithm.oid;
    if algorithm == RSA_ENCRYPTION {
        let key = rsa::RsaPublicKey::from_public_key_der(der)
            .map_err(|e| PassportError::KeyDecode(format!("invalid RSA public key: {e}")))?;
        return Ok(DecodedPublicKey::Rsa {
            n: key.n().to_bytes_be(),
            e: key.e().to_bytes_be(),
        });
    }

    if algorithm != EC_PUBLIC_KEY {
        return Ok(DecodedPublicKey::Unsupported {
            algorithm: algorithm.to_string(),
        });
    }

    let curve_oid = spki
        .algorithm
        .parameters_oid()
        .map_err(|e| PassportError::KeyDecode(format!("EC key without named curve: {e}")))?;
    let Some(curve) = EcCurve::from_oid(curve_oid) else {
        return Ok(DecodedPublicKey::Unsupported {
            algorithm: format!("id-ecPublicKey/{curve_oid}"),
        });
    };

    let point = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| PassportError::KeyDecode("EC point has unused bits".to_string()))?;

    let (x, y) = ec_coordinates(curve, point)?;
    Ok(DecodedPublicKey::Ec { curve, x, y })
}

fn ec_coordinates(curve: EcCurve, point: &[u8]) -> Result<(Vec<u8>, Vec<u8>), PassportError> {
    let invalid = |e: p256::elliptic_curve::Error| {
        PassportError::KeyDecode(format!("invalid {} point: {e}", curve.crv()))
    };

    let encoded = match curve {
        EcCurve::P256 => {
            let key = p256::PublicKey::from_sec1_bytes(point).map_err(invalid)?;
            let encoded = key.to_encoded_point(false);
            (
                encoded.x().map(|x| x.to_vec()),
                encoded.y().map(|y| y.to_vec()),
            )
        }
        EcCurve::P384 => {
            let key = p384::PublicKey::from_sec1_bytes(point).map_err(invalid)?;
            let encoded = key.to_encoded_point(false);
            (
                encoded.x().map(|x| x.to_vec()),
                encoded.y().map(|y| y.to_vec()),
            )
        }
        EcCurve::P521 => {
            let key = p521::PublicKey::from_sec1_bytes(point).map_err(invalid)?;
            let encoded = key.to_encoded_point(false);
            (
                encoded.x().map(|x| x.to_vec()),
                encoded.y().map(|y| y.to_vec()),
            )
        }
    };

    match encoded {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(PassportError::KeyDecode(
            "EC point is the identity".to_string(),
        )),
    }
}

/// PEM armor for a DER SubjectPublicKeyInfo, 64-character lines.
pub fn pem_armor(der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = String::from("-----BEGIN PUBLIC KEY-----\n");
    for line in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(len: usize) -> Result<Vec<u8>, PassportError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|e| PassportError::Internal(format!("Random bytes generation failed: {e}")))?;
    Ok(bytes)
}

/// Unique token identifier: [`JTI_BYTES`] random bytes, base64url.
#[instrument(skip_all)]
pub fn generate_jti() -> Result<String, PassportError> {
    Ok(encode_segment(&generate_random_bytes(JTI_BYTES)?))
}
