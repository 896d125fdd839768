//! The realtime shard task and its handle.

use async_trait::async_trait;
use flarebase_core::SessionId;
use tokio::sync::{mpsc, oneshot};

use crate::connection::{ConnectionHandle, Outbound};
use crate::error::{EngineError, Result};
use crate::events::{EventPublisher, RealtimeEvent};
use crate::realtime::registry::{ConnectionRegistry, RealtimeStats};
use crate::types::EngineConfig;

enum Command {
    Connect {
        handle: ConnectionHandle,
        reply: oneshot::Sender<SessionId>,
    },
    Message {
        session_id: SessionId,
        text: String,
    },
    Disconnect {
        session_id: SessionId,
    },
    Publish {
        events: Vec<RealtimeEvent>,
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<RealtimeStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

async fn run(mut rx: mpsc::Receiver<Command>) {
    let mut registry = ConnectionRegistry::new();
    while let Some(command) = rx.recv().await {
        match command {
            Command::Connect { handle, reply } => {
                let session_id = registry.connect(handle);
                if reply.send(session_id).is_err() {
                    registry.disconnect(session_id);
                }
            }
            Command::Message { session_id, text } => registry.handle_message(session_id, &text),
            Command::Disconnect { session_id } => {
                registry.disconnect(session_id);
            }
            Command::Publish { events, reply } => {
                let delivered = events.iter().map(|e| registry.publish(e)).sum();
                let _ = reply.send(delivered);
            }
            Command::Stats { reply } => {
                let _ = reply.send(registry.stats());
            }
            Command::Shutdown { reply } => {
                registry.close_all();
                let _ = reply.send(());
                break;
            }
        }
    }
    tracing::info!("Realtime shard stopped");
}

fn stopped() -> EngineError {
    EngineError::Internal("realtime shard is not running".into())
}

/// Handle to the shared realtime shard. Cheap to clone.
#[derive(Clone)]
pub struct RealtimeHub {
    tx: mpsc::Sender<Command>,
    session_buffer: usize,
}

impl RealtimeHub {
    /// Spawn the shard task on the current runtime.
    #[must_use]
    pub fn spawn(config: &EngineConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.shard_mailbox.max(1));
        tokio::spawn(run(rx));
        Self {
            tx,
            session_buffer: config.session_buffer,
        }
    }

    /// Register a new socket.
    ///
    /// Returns the session and the queue the socket writer must drain; the
    /// welcome frame is already queued.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Internal` if the shard has stopped.
    pub async fn connect(&self) -> Result<(RealtimeSession, mpsc::Receiver<Outbound>)> {
        let (handle, outbound) = ConnectionHandle::channel(self.session_buffer);
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Command::Connect { handle, reply })
            .await
            .map_err(|_| stopped())?;
        let id = response.await.map_err(|_| stopped())?;
        Ok((
            RealtimeSession {
                id,
                tx: self.tx.clone(),
                closed: false,
            },
            outbound,
        ))
    }

    /// Publish one event. Returns 0 if the shard has stopped.
    pub async fn publish(&self, event: RealtimeEvent) -> usize {
        self.publish_batch(vec![event]).await
    }

    /// Publish events in order, returning the total number of deliveries.
    pub async fn publish_batch(&self, events: Vec<RealtimeEvent>) -> usize {
        if events.is_empty() {
            return 0;
        }
        let (reply, response) = oneshot::channel();
        if self
            .tx
            .send(Command::Publish { events, reply })
            .await
            .is_err()
        {
            tracing::warn!("Realtime shard stopped, dropping events");
            return 0;
        }
        response.await.unwrap_or(0)
    }

    /// Current connection and subscription counts.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Internal` if the shard has stopped.
    pub async fn stats(&self) -> Result<RealtimeStats> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Command::Stats { reply })
            .await
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())
    }

    /// Close every socket and stop the shard. Idempotent.
    pub async fn shutdown(&self) {
        let (reply, response) = oneshot::channel();
        if self.tx.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = response.await;
        }
    }
}

#[async_trait]
impl EventPublisher for RealtimeHub {
    async fn publish(&self, event: RealtimeEvent) -> usize {
        self.publish_batch(vec![event]).await
    }
}

/// One socket's link to the realtime shard.
///
/// Dropping the session disconnects it.
pub struct RealtimeSession {
    id: SessionId,
    tx: mpsc::Sender<Command>,
    closed: bool,
}

impl RealtimeSession {
    /// The session ID.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Forward a text frame from the socket.
    pub async fn message(&self, text: String) {
        let command = Command::Message {
            session_id: self.id,
            text,
        };
        if self.tx.send(command).await.is_err() {
            tracing::debug!(session = %self.id, "Realtime shard stopped, frame dropped");
        }
    }

    /// Disconnect from the shard.
    pub async fn close(mut self) {
        self.closed = true;
        let _ = self
            .tx
            .send(Command::Disconnect {
                session_id: self.id,
            })
            .await;
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.tx.try_send(Command::Disconnect {
                session_id: self.id,
            });
        }
    }
}
