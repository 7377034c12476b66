//! Session token checks
//!
//! HS256 tokens from the account service. `sub` is the internal user id; a
//! token without one is rejected. Signing lives here only for dev mode and
//! tests.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::types::QuestError;

const MIN_SECRET_LEN: usize = 32;
const DEV_SECRET: &str = "dev-only-insecure-secret-for-quests!";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
}

impl JwtValidator {
    pub fn new(secret: String, ttl_seconds: u64) -> Result<Self, QuestError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(QuestError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }
        Ok(Self::from_secret(secret.as_bytes(), ttl_seconds as i64))
    }

    /// Fixed secret; only for dev mode
    pub fn new_dev() -> Self {
        Self::from_secret(DEV_SECRET.as_bytes(), 3600)
    }

    fn from_secret(secret: &[u8], ttl_seconds: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl_seconds,
        }
    }

    pub fn generate_token(&self, user: &str) -> Result<String, QuestError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| QuestError::InternalServer(format!("Failed to sign token: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, QuestError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|err| {
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::InvalidSignature => "bad signature",
                    ErrorKind::MissingRequiredClaim(_) => "token is missing a claim",
                    _ => "invalid token",
                };
                QuestError::Unauthorized(reason.into())
            })?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(QuestError::Unauthorized("token has no subject".into()));
        }
        Ok(claims)
    }

    /// User id behind an `Authorization` header value
    pub fn authenticate(&self, auth_header: Option<&str>) -> Result<String, QuestError> {
        let token = extract_token_from_header(auth_header)
            .ok_or_else(|| QuestError::Unauthorized("missing bearer token".into()))?;
        self.verify_token(token).map(|claims| claims.sub)
    }
}

/// `Bearer <token>`, or a bare token with no scheme
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?.trim_start();
    let token = match header.split_once(' ') {
        Some(("Bearer", rest)) => rest.trim(),
        Some(_) => return None,
        None => header,
    };
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> JwtValidator {
        JwtValidator::new("quest-test-secret-0123456789abcdef".into(), 600).unwrap()
    }

    #[test]
    fn test_signed_token_authenticates_its_subject() {
        let v = validator();
        let header = format!("Bearer {}", v.generate_token("user-42").unwrap());
        assert_eq!(v.authenticate(Some(&header)).unwrap(), "user-42");
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let token = validator().generate_token("user-42").unwrap();
        let other = JwtValidator::new("another-quest-secret-0123456789ab".into(), 600).unwrap();
        assert!(matches!(other.verify_token(&token), Err(QuestError::Unauthorized(_))));
    }

    #[test]
    fn test_expired_and_subjectless_tokens() {
        let v = validator();
        let expired = Claims {
            sub: "user-42".into(),
            iat: 1_000,
            exp: 2_000,
        };
        let token = encode(&Header::default(), &expired, &v.encoding).unwrap();
        assert!(matches!(v.verify_token(&token), Err(QuestError::Unauthorized(m)) if m == "token expired"));

        let now = Utc::now().timestamp();
        let anonymous = Claims {
            sub: " ".into(),
            iat: now,
            exp: now + 60,
        };
        let token = encode(&Header::default(), &anonymous, &v.encoding).unwrap();
        assert!(v.verify_token(&token).is_err());
    }

    #[test]
    fn test_missing_header_is_unauthorized() {
        assert!(matches!(validator().authenticate(None), Err(QuestError::Unauthorized(_))));
    }

    #[test]
    fn test_header_forms() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_short_secret_is_a_config_error() {
        assert!(matches!(
            JwtValidator::new("short".into(), 600),
            Err(QuestError::Config(_))
        ));
    }
}
