//! Realtime endpoints.
//!
//! Clients subscribe to collections over `/api/realtime` and receive an
//! `event` frame for every committed record write.

use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;

use flarebase_auth::JwtValidator;
use flarebase_engine::CollectionEngine;

use crate::error::ApiError;
use crate::handlers::ws;
use crate::state::GatewayState;

/// Upgrade to a realtime socket.
///
/// The session is registered with the realtime shard before the upgrade
/// response is sent, so the welcome frame is the first frame on the socket.
///
/// # Errors
///
/// Returns `UpgradeRequired` without an upgrade request, or an internal
/// error if the realtime shard has stopped.
pub async fn connect<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    headers: HeaderMap,
    upgrade: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let upgrade = upgrade.ok_or_else(|| ws::upgrade_required(&headers, "/api/realtime"))?;

    let (session, outbound) = state.realtime.connect().await?;
    let timeout = state.config.websocket_timeout();

    tracing::info!(session_id = %session.id(), "Realtime socket connected");

    Ok(upgrade.on_upgrade(move |socket| ws::drive(socket, session, outbound, timeout)))
}

/// Connection and subscription counts.
///
/// # Errors
///
/// Returns an internal error if the realtime shard has stopped.
pub async fn stats<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let stats = state.realtime.stats().await?;
    Ok(Json(stats))
}
