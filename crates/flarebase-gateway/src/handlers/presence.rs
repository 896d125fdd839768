//! Presence endpoints.
//!
//! Each `userId` has its own presence shard. Sockets attach with
//! `/api/presence/connect?userId=`, and the HTTP routes below read the
//! cached snapshots or act on a user's shard directly.

use std::sync::Arc;

use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use flarebase_auth::JwtValidator;
use flarebase_core::now_timestamp;
use flarebase_engine::{CollectionEngine, PresenceMetadata, PresenceStatus};

use crate::error::ApiError;
use crate::handlers::ws;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// The `userId` query parameter.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    /// User to act on. Missing selects the anonymous shard.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Body of a status update.
#[derive(Debug, Deserialize)]
pub struct StatusBody {
    /// `online`, `away`, `busy` or `offline`.
    pub status: String,
    /// Keys to merge into the user's metadata.
    #[serde(default)]
    pub metadata: Option<PresenceMetadata>,
}

/// Response for a status update.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Outcome.
    pub message: &'static str,
    /// The user that was updated.
    pub user_id: String,
    /// The new status.
    pub status: PresenceStatus,
    /// The user's metadata after the merge.
    pub metadata: PresenceMetadata,
    /// Server time.
    pub timestamp: String,
}

/// Response for a forced disconnect.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResponse {
    /// Outcome.
    pub message: &'static str,
    /// The user that was disconnected.
    pub user_id: String,
    /// How many sockets were closed.
    pub disconnected_sessions: usize,
    /// Server time.
    pub timestamp: String,
}

fn require_user(query: UserQuery) -> Result<String, ApiError> {
    query
        .user_id
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("userId is required".to_string()))
}

// =============================================================================
// Handlers
// =============================================================================

/// Upgrade to a presence socket for `userId`.
///
/// # Errors
///
/// Returns `UpgradeRequired` without an upgrade request, or an internal
/// error if the presence hub has shut down.
pub async fn connect<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    Query(query): Query<UserQuery>,
    headers: HeaderMap,
    upgrade: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let upgrade =
        upgrade.ok_or_else(|| ws::upgrade_required(&headers, "/api/presence/connect"))?;

    let (session, outbound) = state.presence.connect(query.user_id).await?;
    let timeout = state.config.websocket_timeout();

    tracing::info!(session_id = %session.id(), "Presence socket connected");

    Ok(upgrade.on_upgrade(move |socket| ws::drive(socket, session, outbound, timeout)))
}

/// Users currently online across every shard.
///
/// # Errors
///
/// Returns an error if the presence cache cannot be read.
pub async fn list_users<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let users = state.presence.online_users().await?;
    Ok(Json(users))
}

/// One user's cached presence.
///
/// # Errors
///
/// Returns `NotFound` if no shard snapshot contains the user.
pub async fn get_user<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let presence = state.presence.user_presence(&user_id).await?;
    Ok(Json(presence))
}

/// Set a user's status and broadcast the change to their shard.
///
/// # Errors
///
/// Returns an error if `userId` is missing, the status is unknown, or the
/// shard has never seen the user.
pub async fn update_status<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    Query(query): Query<UserQuery>,
    Json(body): Json<StatusBody>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let user_id = require_user(query)?;
    let status: PresenceStatus = body.status.parse().map_err(ApiError::BadRequest)?;

    let user = state
        .presence
        .update_status(Some(&user_id), status, body.metadata)
        .await?;

    Ok(Json(StatusResponse {
        message: "Status updated successfully",
        user_id: user.id,
        status: user.status,
        metadata: user.metadata,
        timestamp: now_timestamp(),
    }))
}

/// Close every socket of a user.
///
/// # Errors
///
/// Returns an error if `userId` is missing or the presence hub has shut down.
pub async fn disconnect_user<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let user_id = require_user(query)?;
    let closed = state.presence.disconnect_user(Some(&user_id)).await?;

    tracing::info!(user_id = %user_id, sessions = closed, "User disconnected");

    Ok(Json(DisconnectResponse {
        message: "User disconnected successfully",
        user_id,
        disconnected_sessions: closed,
        timestamp: now_timestamp(),
    }))
}
