//! Health check endpoint.
//!
//! This module provides the public health check endpoint.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service name.
    pub name: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Service status.
    pub status: &'static str,
}

/// Health check handler.
///
/// Served on both `/` and `/health`. This endpoint is public and
/// does not require authentication.
///
/// # Example
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "name": "Flarebase",
///   "version": "0.1.0",
///   "status": "healthy"
/// }
/// ```
pub async fn health() -> impl IntoResponse {
    let response = HealthResponse {
        name: "Flarebase",
        version: env!("CARGO_PKG_VERSION"),
        status: "healthy",
    };

    (StatusCode::OK, Json(response))
}
