//! WebSocket plumbing shared by the realtime and presence sockets.
//!
//! An upgraded socket is bridged to a shard session: text frames read from
//! the client are forwarded to the shard, and frames the shard queues on the
//! session's outbound channel are written back to the client.

use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::http::header::HOST;
use axum::http::HeaderMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use flarebase_engine::{Outbound, PresenceSession, RealtimeSession};

use crate::error::ApiError;

/// A shard session a socket can be bridged to.
#[async_trait]
pub trait ShardSession: Send + Sync + 'static {
    /// Log label for the session.
    fn label(&self) -> String;

    /// Forward a client text frame to the shard.
    async fn forward(&self, text: String);

    /// Detach from the shard.
    async fn finish(self);
}

#[async_trait]
impl ShardSession for RealtimeSession {
    fn label(&self) -> String {
        self.id().to_string()
    }

    async fn forward(&self, text: String) {
        self.message(text).await;
    }

    async fn finish(self) {
        self.close().await;
    }
}

#[async_trait]
impl ShardSession for PresenceSession {
    fn label(&self) -> String {
        self.id().to_string()
    }

    async fn forward(&self, text: String) {
        self.message(text).await;
    }

    async fn finish(self) {
        self.close().await;
    }
}

/// The error returned when a socket endpoint is hit without an upgrade.
pub fn upgrade_required(headers: &HeaderMap, path: &str) -> ApiError {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    ApiError::UpgradeRequired {
        websocket_url: format!("ws://{host}{path}"),
    }
}

/// Pump frames between `socket` and `session` until either side closes.
///
/// The socket is closed when the client sends nothing for `idle_timeout`.
/// Frames written to the client do not count as activity.
pub async fn drive<S: ShardSession>(
    socket: WebSocket,
    session: S,
    mut outbound: mpsc::Receiver<Outbound>,
    idle_timeout: Duration,
) {
    let label = session.label();
    let (mut sink, mut stream) = socket.split();
    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::debug!(session = %label, error = %e, "Socket write failed");
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = stream.next() => {
                idle.as_mut().reset(Instant::now() + idle_timeout);
                match incoming {
                    Some(Ok(Message::Text(text))) => session.forward(text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(session = %label, error = %e, "Socket read failed");
                        break;
                    }
                }
            },
            () = &mut idle => {
                tracing::debug!(session = %label, "Socket idle, closing");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    session.finish().await;
    tracing::debug!(session = %label, "Socket closed");
}
