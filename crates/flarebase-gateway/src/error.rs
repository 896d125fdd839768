//! API error types and responses.
//!
//! This module defines the standard error format for all API responses.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use flarebase_auth::AuthError;
use flarebase_engine::EngineError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid authentication token.
    #[error("unauthorized")]
    Unauthorized,

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A socket endpoint was called without a WebSocket upgrade.
    #[error("WebSocket upgrade required")]
    UpgradeRequired {
        /// Where the client should connect instead.
        websocket_url: String,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpgradeRequiredResponse {
    error: String,
    websocket_url: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) | Self::UpgradeRequired { .. } => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadRequest(_) => "bad_request",
            Self::UpgradeRequired { .. } => "upgrade_required",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if let Self::UpgradeRequired { websocket_url } = self {
            let body = UpgradeRequiredResponse {
                error: message,
                websocket_url,
            };
            return (status, Json(body)).into_response();
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExpired
            | AuthError::InvalidSignature
            | AuthError::MissingClaim(_)
            | AuthError::InvalidToken(_) => Self::Unauthorized,
            AuthError::Internal(_) => {
                tracing::error!(error = %err, "Auth internal error");
                Self::Internal("authentication service error".to_string())
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::CollectionNotFound(name) => Self::NotFound(format!("collection {name}")),
            EngineError::RecordNotFound { collection, id } => {
                Self::NotFound(format!("record {id} in collection {collection}"))
            }
            EngineError::UserNotFound(id) => Self::NotFound(format!("user {id}")),
            EngineError::FileNotFound(id) => Self::NotFound(format!("file {id}")),
            EngineError::DuplicateName(name) => {
                Self::Conflict(format!("collection {name} already exists"))
            }
            EngineError::InvalidSchema(_)
            | EngineError::Validation(_)
            | EngineError::Protocol(_) => Self::BadRequest(err.to_string()),
            EngineError::Store(store_err) => {
                tracing::error!(error = %store_err, "Store error");
                Self::Internal("storage error".to_string())
            }
            EngineError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                Self::Internal(msg)
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(err.body_text())
    }
}
