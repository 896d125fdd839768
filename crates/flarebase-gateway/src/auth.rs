//! Authentication middleware and extractors.
//!
//! This module provides the `AuthUser` extractor that validates JWT tokens
//! and extracts user identity from requests.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use flarebase_auth::{JwtValidator, ValidatedClaims};
use flarebase_engine::CollectionEngine;

use crate::error::ApiError;
use crate::state::GatewayState;

/// An authenticated user extracted from a JWT token.
///
/// This extractor validates the `Authorization: Bearer <token>` header
/// and provides access to the user's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// The user ID from the token.
    pub user_id: String,
    /// Email claim, if present.
    pub email: Option<String>,
    /// Role claim, if present.
    pub role: Option<String>,
}

impl AuthUser {
    /// Create an `AuthUser` from validated claims.
    #[must_use]
    pub fn from_claims(claims: ValidatedClaims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
            role: claims.role,
        }
    }
}

#[async_trait]
impl<E, V> FromRequestParts<Arc<GatewayState<E, V>>> for AuthUser
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState<E, V>>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let claims = state.jwt_validator.validate(token).await?;

        Ok(Self::from_claims(claims))
    }
}
