//! Bearer token handling for secured routes.
//!
//! Tokens are inspected twice: first decoded *without* any signature check
//! to learn which client they claim to belong to, and only after that client
//! is found in the directory, verified against the shared HMAC secret.
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::Value;
use thiserror::Error;

use crate::config::models::SecuritySettings;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token could not be decoded: {0}")]
    Malformed(#[source] jsonwebtoken::errors::Error),
    #[error("token verification failed: {0}")]
    Verification(#[from] jsonwebtoken::errors::Error),
}

/// Decodes and verifies HMAC-signed bearer tokens.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    unverified: Validation,
    client_claim: String,
}

impl TokenVerifier {
    pub fn new(settings: &SecuritySettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // exp / nbf are checked when present, but no claim is mandatory
        validation.required_spec_claims.clear();
        validation.validate_aud = false;
        validation.leeway = 0;

        // payload only: no signature, time or audience checks
        let mut unverified = validation.clone();
        unverified.insecure_disable_signature_validation();
        unverified.validate_exp = false;
        unverified.validate_nbf = false;

        Self {
            key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            validation,
            unverified,
            client_claim: settings.client_claim.clone(),
        }
    }

    /// Read the payload without checking the signature.
    pub fn decode_unverified(&self, token: &str) -> Result<Value, TokenError> {
        decode::<Value>(token, &self.key, &self.unverified)
            .map(|data| data.claims)
            .map_err(TokenError::Malformed)
    }

    /// Verify signature and time-based claims, returning the claims.
    pub fn verify(&self, token: &str) -> Result<Value, TokenError> {
        let data = decode::<Value>(token, &self.key, &self.validation)?;
        Ok(data.claims)
    }

    /// The client identifier a token claims, if any.
    pub fn claimed_client(&self, claims: &Value) -> Option<String> {
        match claims.get(&self.client_claim)? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// Whether the token's `scope` claim (space separated string or array)
/// contains `required`.
pub fn scope_includes(claims: &Value, required: &str) -> bool {
    match claims.get("scope") {
        Some(Value::String(scopes)) => scopes.split_whitespace().any(|s| s == required),
        Some(Value::Array(scopes)) => scopes.iter().any(|s| s.as_str() == Some(required)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    use super::*;

    fn settings(secret: &str) -> SecuritySettings {
        SecuritySettings {
            jwt_secret: secret.to_string(),
            ..SecuritySettings::default()
        }
    }

    fn sign(claims: &Value, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_unverified_ignores_signature() {
        let verifier = TokenVerifier::new(&settings("right"));
        let token = sign(&json!({"user_id": "c1"}), "wrong");

        let claims = verifier.decode_unverified(&token).unwrap();
        assert_eq!(verifier.claimed_client(&claims).as_deref(), Some("c1"));
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_decode_unverified_rejects_garbage() {
        let verifier = TokenVerifier::new(&settings("s"));
        assert!(matches!(
            verifier.decode_unverified("not-a-token"),
            Err(TokenError::Malformed(_))
        ));
        assert!(verifier.decode_unverified("a.!!!.c").is_err());
        // valid base64 but not JSON
        assert!(verifier.decode_unverified("a.aGVsbG8.c").is_err());
    }

    #[test]
    fn test_decode_unverified_ignores_expiry() {
        let verifier = TokenVerifier::new(&settings("s3cret"));
        let token = sign(&json!({"user_id": "c1", "exp": 1_000}), "s3cret");

        let claims = verifier.decode_unverified(&token).unwrap();
        assert_eq!(verifier.claimed_client(&claims).as_deref(), Some("c1"));
    }

    #[test]
    fn test_verify_accepts_token_without_exp() {
        let verifier = TokenVerifier::new(&settings("s3cret"));
        let token = sign(&json!({"user_id": "c1"}), "s3cret");
        assert_eq!(verifier.verify(&token).unwrap()["user_id"], "c1");
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let verifier = TokenVerifier::new(&settings("s3cret"));
        let token = sign(&json!({"user_id": "c1", "exp": 1_000}), "s3cret");
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_claimed_client_uses_configured_claim() {
        let verifier = TokenVerifier::new(&SecuritySettings {
            jwt_secret: "s".to_string(),
            client_claim: "sub".to_string(),
            enforce_scope: false,
        });
        assert_eq!(
            verifier.claimed_client(&json!({"sub": 42})).as_deref(),
            Some("42")
        );
        assert!(verifier.claimed_client(&json!({"user_id": "x"})).is_none());
    }

    #[test]
    fn test_scope_includes() {
        assert!(scope_includes(&json!({"scope": "read write"}), "write"));
        assert!(scope_includes(&json!({"scope": ["read", "admin"]}), "admin"));
        assert!(!scope_includes(&json!({"scope": "read"}), "write"));
        assert!(!scope_includes(&json!({}), "read"));
    }
}
