//! Compact JWS assembly around custodian signatures.

use crate::errors::PassportError;
use crate::keys::{KeyHandle, SigningMethod};
use common::jose::{encode_json_segment, encode_segment, signing_input};
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, Serialize)]
struct JwsHeader<'a> {
    alg: &'static str,
    typ: &'static str,
    kid: &'a str,
}

/// Signs `claims` with `signer` and returns `header.payload.signature`.
///
/// The protected header is `{alg, typ: "JWT", kid}`.
#[instrument(skip_all, fields(group = %signer.group(), kid = %signer.kid()))]
pub async fn sign_compact<T>(signer: &KeyHandle, claims: &T) -> Result<String, PassportError>
where
    T: Serialize + ?Sized,
{
    let method = signer.signing_method()?;

    let header = JwsHeader {
        alg: method.jws_alg(),
        typ: "JWT",
        kid: signer.kid(),
    };
    let header_b64 = encode_json_segment(&header)
        .map_err(|e| PassportError::Internal(format!("JWS header: {e}")))?;
    let payload_b64 = encode_json_segment(claims)
        .map_err(|e| PassportError::Internal(format!("JWS payload: {e}")))?;

    let input = signing_input(&header_b64, &payload_b64);
    let raw = signer.sign(input.as_bytes()).await?;

    let signature = jws_signature(method, &raw).map_err(|reason| PassportError::Signing {
        group: signer.group(),
        kid: signer.kid().to_string(),
        reason,
    })?;

    Ok(format!("{input}.{}", encode_segment(&signature)))
}

/// Converts a custodian signature to its JWS form.
///
/// ECDSA signatures are accepted DER-encoded or already fixed-width and come
/// out as `r || s`. RSA signatures pass through.
pub fn jws_signature(method: SigningMethod, raw: &[u8]) -> Result<Vec<u8>, String> {
    match method {
        SigningMethod::Ps256 => {
            if raw.is_empty() {
                Err("empty RSA signature".to_string())
            } else {
                Ok(raw.to_vec())
            }
        }
        SigningMethod::Es256 => p256::ecdsa::Signature::from_der(raw)
            .or_else(|_| p256::ecdsa::Signature::from_slice(raw))
            .map(|sig| sig.to_bytes().to_vec())
            .map_err(|e| format!("malformed ES256 signature: {e}")),
        SigningMethod::Es384 => p384::ecdsa::Signature::from_der(raw)
            .or_else(|_| p384::ecdsa::Signature::from_slice(raw))
            .map(|sig| sig.to_bytes().to_vec())
            .map_err(|e| format!("malformed ES384 signature: {e}")),
        SigningMethod::Es512 => p521::ecdsa::Signature::from_der(raw)
            .or_else(|_| p521::ecdsa::Signature::from_slice(raw))
            .map(|sig| sig.to_bytes().to_vec())
            .map_err(|e| format!("malformed ES512 signature: {e}")),
    }
}
