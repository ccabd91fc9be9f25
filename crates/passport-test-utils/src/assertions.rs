//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions for compact tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;

fn decode_part(token: &str, index: usize, what: &str) -> Value {
    let part = token
        .split('.')
        .nth(index)
        .unwrap_or_else(|| panic!("token has no {what} segment"));
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .unwrap_or_else(|e| panic!("Failed to base64 decode {what}: {e}"));
    serde_json::from_slice(&bytes).unwrap_or_else(|e| panic!("Failed to parse {what} JSON: {e}"))
}

/// Protected header of a compact JWS or JWE.
pub fn token_header(token: &str) -> Value {
    decode_part(token, 0, "header")
}

/// Payload of a compact JWS, unverified.
pub fn token_claims(token: &str) -> Value {
    decode_part(token, 1, "payload")
}

fn validation(alg: Algorithm) -> Validation {
    // Tokens in tests are minted against fixed clocks, so time claims are
    // asserted explicitly instead.
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

/// Verifies a JWS against a PEM public key and returns its claims.
pub fn verify_with_pem(token: &str, alg: Algorithm, pem: &str) -> Value {
    let key = match alg {
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem.as_bytes()),
        _ => DecodingKey::from_rsa_pem(pem.as_bytes()),
    }
    .unwrap_or_else(|e| panic!("Failed to load PEM for {alg:?}: {e}"));

    decode::<Value>(token, &key, &validation(alg))
        .unwrap_or_else(|e| panic!("Signature verification failed: {e}"))
        .claims
}

/// Verifies a JWS against one published JWK and returns its claims.
pub fn verify_with_jwk(token: &str, alg: Algorithm, jwk: &Value) -> Value {
    let jwk: Jwk = serde_json::from_value(jwk.clone())
        .unwrap_or_else(|e| panic!("Published JWK does not parse: {e}"));
    let key = DecodingKey::from_jwk(&jwk).unwrap_or_else(|e| panic!("Unusable JWK: {e}"));

    decode::<Value>(token, &key, &validation(alg))
        .unwrap_or_else(|e| panic!("Signature verification failed: {e}"))
        .claims
}

/// Custom assertions for compact tokens
///
/// # Example
/// ```rust,ignore
/// token
///     .assert_valid_jws()
///     .assert_header("alg", "ES256")
///     .assert_claim("iss", "https://auth.example.com");
/// ```
pub trait TokenAssertions {
    /// Assert three base64url segments with JSON header and payload
    fn assert_valid_jws(&self) -> &Self;

    /// Assert five segments with a JSON header
    fn assert_valid_jwe(&self) -> &Self;

    /// Assert a protected header value
    fn assert_header(&self, name: &str, expected: &str) -> &Self;

    /// Assert a string claim of the payload
    fn assert_claim(&self, name: &str, expected: &str) -> &Self;

    /// Assert `exp - iat` equals `seconds`
    fn assert_lifetime(&self, seconds: i64) -> &Self;
}

impl TokenAssertions for str {
    fn assert_valid_jws(&self) -> &Self {
        let parts: Vec<_> = self.split('.').collect();
        assert_eq!(
            parts.len(),
            3,
            "JWS must have 3 parts (header.payload.signature), got {}",
            parts.len()
        );
        let header = token_header(self);
        assert_eq!(header["typ"], "JWT", "Expected JWT type");
        assert!(header["kid"].is_string(), "JWS header must carry a kid");
        let _ = token_claims(self);
        assert!(
            !parts[2].is_empty(),
            "JWS signature segment must not be empty"
        );
        self
    }

    fn assert_valid_jwe(&self) -> &Self {
        let parts: Vec<_> = self.split('.').collect();
        assert_eq!(parts.len(), 5, "JWE must have 5 parts, got {}", parts.len());
        let header = token_header(self);
        assert!(
            matches!(header["alg"].as_str(), Some("RSA-OAEP-256" | "RSA-OAEP")),
            "Unexpected JWE key wrap {}",
            header["alg"]
        );
        assert_eq!(header["enc"], "A256GCM");
        self
    }

    fn assert_header(&self, name: &str, expected: &str) -> &Self {
        assert_eq!(
            token_header(self)[name],
            expected,
            "Header {name} mismatch"
        );
        self
    }

    fn assert_claim(&self, name: &str, expected: &str) -> &Self {
        assert_eq!(token_claims(self)[name], expected, "Claim {name} mismatch");
        self
    }

    fn assert_lifetime(&self, seconds: i64) -> &Self {
        let claims = token_claims(self);
        let iat = claims["iat"].as_i64().expect("iat must be an integer");
        let exp = claims["exp"].as_i64().expect("exp must be an integer");
        assert_eq!(exp - iat, seconds, "Token lifetime mismatch");
        self
    }
}

impl TokenAssertions for String {
    fn assert_valid_jws(&self) -> &Self {
        self.as_str().assert_valid_jws();
        self
    }

    fn assert_valid_jwe(&self) -> &Self {
        self.as_str().assert_valid_jwe();
        self
    }

    fn assert_header(&self, name: &str, expected: &str) -> &Self {
        self.as_str().assert_header(name, expected);
        self
    }

    fn assert_claim(&self, name: &str, expected: &str) -> &Self {
        self.as_str().assert_claim(name, expected);
        self
    }

    fn assert_lifetime(&self, seconds: i64) -> &Self {
        self.as_str().assert_lifetime(seconds);
        self
    }
}
