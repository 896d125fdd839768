//! JWT authentication for flarebase.
//!
//! Collection and record routes require a bearer token signed with the
//! deployment's shared secret (HS256). This crate validates such tokens and
//! extracts the caller's claims.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│   JwtValidator   │
//! │   (HTTP/WS)      │     │   (trait)        │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │ HmacJwtValidator │
//!                          │ (HS256 secret)   │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use flarebase_auth::{AuthConfig, HmacJwtValidator, JwtValidator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let validator = HmacJwtValidator::new(AuthConfig::new("change-me"));
//!
//! // In a request handler:
//! let token = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...";
//! let claims = validator.validate(token).await?;
//!
//! println!("User ID: {}", claims.user_id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod jwt;

use std::fmt;

pub use error::{AuthError, Result};
pub use jwt::{HmacJwtValidator, JwtValidator, ValidatedClaims};

#[cfg(any(test, feature = "test-utils"))]
pub use jwt::MockJwtValidator;

/// Configuration for bearer-token authentication.
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared HS256 signing secret.
    pub secret: String,
    /// Clock skew tolerated when checking `exp`, in seconds.
    pub leeway_seconds: u64,
}

impl AuthConfig {
    /// Configuration for `secret` with the default leeway.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            leeway_seconds: 60,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_leeway() {
        let config = AuthConfig::new("s3cret");
        assert_eq!(config.secret, "s3cret");
        assert_eq!(config.leeway_seconds, 60);
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", AuthConfig::new("s3cret"));
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn auth_error_status_codes() {
        assert_eq!(AuthError::TokenExpired.http_status_code(), 401);
        assert_eq!(AuthError::InvalidSignature.http_status_code(), 401);
        assert_eq!(AuthError::MissingClaim("id".into()).http_status_code(), 401);
        assert_eq!(AuthError::Internal("test".into()).http_status_code(), 500);
    }

    #[test]
    fn auth_error_retriable() {
        assert!(AuthError::TokenExpired.is_retriable());
        assert!(!AuthError::InvalidSignature.is_retriable());
        assert!(!AuthError::InvalidToken("x".into()).is_retriable());
    }
}
