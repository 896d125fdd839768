//! JWT validation and claims extraction.
//!
//! This module provides the core JWT validation logic, including signature
//! verification and claims validation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::{AuthError, Result};
use crate::AuthConfig;

/// Validated claims extracted from a JWT.
#[derive(Debug, Clone)]
pub struct ValidatedClaims {
    /// The user ID, from the `id` claim (or `sub` when `id` is absent).
    pub user_id: String,
    /// The user's email, if present.
    pub email: Option<String>,
    /// The user's role, if present.
    pub role: Option<String>,
    /// When the token expires; tokens without `exp` never do.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Trait for validating JWTs.
#[async_trait]
pub trait JwtValidator: Send + Sync {
    /// Validate a JWT and extract claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid, expired, or cannot be validated.
    async fn validate(&self, token: &str) -> Result<ValidatedClaims>;
}

/// Raw claims from a JWT before validation.
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    /// Expiration timestamp (validated by jsonwebtoken when present)
    #[serde(default)]
    exp: Option<u64>,
}

/// Shared-secret (HS256) JWT validator.
pub struct HmacJwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl HmacJwtValidator {
    /// Create a validator for tokens signed with `config.secret`.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Tokens are issued without `exp`; it is still checked when present.
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = config.leeway_seconds;

        Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl JwtValidator for HmacJwtValidator {
    async fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        let token_data = decode::<RawClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        let claims = token_data.claims;

        let user_id = claims
            .id
            .or(claims.sub)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::MissingClaim("id".to_string()))?;

        let expires_at = match claims.exp {
            Some(exp) => {
                let exp_secs = i64::try_from(exp).unwrap_or(i64::MAX);
                Some(
                    DateTime::from_timestamp(exp_secs, 0)
                        .ok_or_else(|| AuthError::InvalidToken("invalid exp timestamp".into()))?,
                )
            }
            None => None,
        };

        tracing::trace!(user_id = %user_id, "Validated bearer token");

        Ok(ValidatedClaims {
            user_id,
            email: claims.email,
            role: claims.role,
            expires_at,
        })
    }
}

/// A mock JWT validator for testing.
///
/// This validator accepts any token in the format `test-token:<user_id>`.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MockJwtValidator {
    /// Role reported for all validated tokens.
    pub role: Option<String>,
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl JwtValidator for MockJwtValidator {
    async fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        let user_id = token
            .strip_prefix("test-token:")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::InvalidToken("expected test-token:<user_id>".to_string()))?;

        Ok(ValidatedClaims {
            user_id: user_id.to_string(),
            email: None,
            role: self.role.clone(),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn sign(claims: &serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn validator() -> HmacJwtValidator {
        HmacJwtValidator::new(AuthConfig::new(SECRET))
    }

    #[tokio::test]
    async fn accepts_token_without_exp() {
        let token = sign(
            &json!({"id": "u1", "email": "a@example.com", "role": "admin"}),
            SECRET,
        );
        let claims = validator().validate(&token).await.unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.email.as_deref(), Some("a@example.com"));
        assert_eq!(claims.role.as_deref(), Some("admin"));
        assert!(claims.expires_at.is_none());
    }

    #[tokio::test]
    async fn falls_back_to_sub() {
        let exp = Utc::now().timestamp() + 3600;
        let token = sign(&json!({"sub": "u2", "exp": exp}), SECRET);
        let claims = validator().validate(&token).await.unwrap();
        assert_eq!(claims.user_id, "u2");
        assert_eq!(claims.expires_at.unwrap().timestamp(), exp);
    }

    #[tokio::test]
    async fn rejects_expired() {
        let exp = Utc::now().timestamp() - 3600;
        let token = sign(&json!({"id": "u1", "exp": exp}), SECRET);
        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn rejects_wrong_secret() {
        let token = sign(&json!({"id": "u1"}), "other-secret");
        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature));
    }

    #[tokio::test]
    async fn rejects_missing_user() {
        let token = sign(&json!({"email": "a@example.com"}), SECRET);
        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingClaim(_)));
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let err = validator().validate("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn mock_validator_works() {
        let validator = MockJwtValidator::default();
        let claims = validator.validate("test-token:alice").await.unwrap();
        assert_eq!(claims.user_id, "alice");
        assert!(claims.role.is_none());
    }

    #[tokio::test]
    async fn mock_validator_rejects_invalid() {
        let validator = MockJwtValidator::default();
        assert!(validator.validate("invalid-token").await.is_err());
        assert!(validator.validate("test-token:").await.is_err());
    }
}
