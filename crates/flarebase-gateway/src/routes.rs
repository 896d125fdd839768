//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use flarebase_auth::JwtValidator;
use flarebase_engine::CollectionEngine;

use crate::handlers::{collections, health, presence, realtime, records, storage};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /`, `GET /health` - Health check
/// - `GET /api/storage/:id/public` - Public file contents
///
/// ## Collections (authenticated)
/// - `GET /api/collections` - List collections
/// - `POST /api/collections` - Create collection
/// - `GET /api/collections/:id` - Get collection
/// - `PUT /api/collections/:id` - Update collection
/// - `DELETE /api/collections/:id` - Delete collection
///
/// ## Records (authenticated)
/// - `GET /api/collections/:collection/records` - List records
/// - `POST /api/collections/:collection/records` - Create record
/// - `GET /api/collections/:collection/records/:id` - Get record
/// - `PUT /api/collections/:collection/records/:id` - Update record
/// - `DELETE /api/collections/:collection/records/:id` - Delete record
///
/// ## Realtime
/// - `GET /api/realtime` - WebSocket connection
/// - `GET /api/realtime/stats` - Connection counts
///
/// ## Presence
/// - `GET /api/presence/connect?userId=` - WebSocket connection
/// - `GET /api/presence/users` - Online users
/// - `GET /api/presence/users/:user_id` - One user's presence
/// - `POST /api/presence/status?userId=` - Update status
/// - `POST /api/presence/disconnect?userId=` - Close a user's sockets
///
/// ## Storage (authenticated)
/// - `GET /api/storage` - List files
/// - `POST /api/storage` - Upload file
/// - `GET /api/storage/:id` - File metadata, contents with `?download=1`
/// - `DELETE /api/storage/:id` - Delete file
pub fn create_router<E, V>(state: GatewayState<E, V>) -> Router
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/", get(health::health))
        .route("/health", get(health::health))
        // Collections
        .route(
            "/api/collections",
            get(collections::list_collections::<E, V>)
                .post(collections::create_collection::<E, V>),
        )
        .route(
            "/api/collections/:collection",
            get(collections::get_collection::<E, V>)
                .put(collections::update_collection::<E, V>)
                .delete(collections::delete_collection::<E, V>),
        )
        // Records
        .route(
            "/api/collections/:collection/records",
            get(records::list_records::<E, V>).post(records::create_record::<E, V>),
        )
        .route(
            "/api/collections/:collection/records/:id",
            get(records::get_record::<E, V>)
                .put(records::update_record::<E, V>)
                .delete(records::delete_record::<E, V>),
        )
        // Realtime
        .route("/api/realtime", get(realtime::connect::<E, V>))
        .route("/api/realtime/stats", get(realtime::stats::<E, V>))
        // Presence
        .route("/api/presence/connect", get(presence::connect::<E, V>))
        .route("/api/presence/users", get(presence::list_users::<E, V>))
        .route(
            "/api/presence/users/:user_id",
            get(presence::get_user::<E, V>),
        )
        .route("/api/presence/status", post(presence::update_status::<E, V>))
        .route(
            "/api/presence/disconnect",
            post(presence::disconnect_user::<E, V>),
        )
        // Storage
        .route(
            "/api/storage",
            get(storage::list_files::<E, V>).post(storage::upload_file::<E, V>),
        )
        .route(
            "/api/storage/:id",
            get(storage::get_file::<E, V>).delete(storage::delete_file::<E, V>),
        )
        .route(
            "/api/storage/:id/public",
            get(storage::get_public_file::<E, V>),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
