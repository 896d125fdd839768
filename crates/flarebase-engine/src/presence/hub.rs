//! Presence shard routing.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use flarebase_core::SessionId;
use flarebase_store::{KvCache, PresenceMetadata, PresenceStatus, PresenceStore, PresenceUser};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::connection::{ConnectionHandle, Outbound};
use crate::error::{EngineError, Result};
use crate::presence::tracker::{PresenceTracker, CACHE_PREFIX};
use crate::types::EngineConfig;

/// Shard used when a caller names no user.
pub const ANONYMOUS_SHARD: &str = "anonymous";

enum Command {
    Connect {
        handle: ConnectionHandle,
        user_id: Option<String>,
        reply: oneshot::Sender<SessionId>,
    },
    Message {
        session_id: SessionId,
        text: String,
    },
    Disconnect {
        session_id: SessionId,
    },
    UpdateStatus {
        user_id: String,
        status: PresenceStatus,
        metadata: Option<PresenceMetadata>,
        reply: oneshot::Sender<Result<PresenceUser>>,
    },
    DisconnectUser {
        user_id: String,
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A running shard's claim on its hub entry.
struct ShardSlot {
    key: String,
    generation: u64,
    shards: Arc<Mutex<Shards>>,
}

impl ShardSlot {
    /// Remove this shard's hub entry so the next call spawns a fresh one.
    fn release(&self) {
        let mut shards = self.shards.lock();
        if shards
            .senders
            .get(&self.key)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            shards.senders.remove(&self.key);
        }
    }
}

async fn run(slot: ShardSlot, mut tracker: PresenceTracker, mut rx: mpsc::Receiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Connect {
                handle,
                user_id,
                reply,
            } => {
                let session_id = tracker.connect(handle, user_id).await;
                if reply.send(session_id).is_err() {
                    tracker.disconnect(session_id).await;
                }
            }
            Command::Message { session_id, text } => {
                tracker.handle_message(session_id, &text).await;
            }
            Command::Disconnect { session_id } => tracker.disconnect(session_id).await,
            Command::UpdateStatus {
                user_id,
                status,
                metadata,
                reply,
            } => {
                let result = tracker.update_status(&user_id, status, metadata).await;
                let _ = reply.send(result);
            }
            Command::DisconnectUser { user_id, reply } => {
                let count = tracker.disconnect_user(&user_id).await;
                let _ = reply.send(count);
            }
            Command::Shutdown { reply } => {
                tracker.close_all();
                let _ = reply.send(());
                return;
            }
        }

        if tracker.session_count() == 0 {
            break;
        }
    }

    slot.release();
    rx.close();
    // Replies of commands queued before the close are dropped; callers retry.
    while rx.recv().await.is_some() {}
    tracing::debug!(shard = %slot.key, "Retired presence shard");
}

fn stopped() -> EngineError {
    EngineError::Internal("presence shard is not running".into())
}

/// Online users across every shard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnlineUsers {
    /// Users not offline and seen within the TTL.
    pub users: Vec<PresenceUser>,
    /// `users.len()`.
    pub count: usize,
    /// Users in the snapshots before filtering.
    pub total: usize,
}

/// One user's cached presence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    /// The cached entry.
    #[serde(flatten)]
    pub user: PresenceUser,
    /// Seen within the TTL.
    pub is_online: bool,
    /// Milliseconds since the user was last seen.
    pub last_seen_ago: i64,
}

struct ShardEntry {
    tx: mpsc::Sender<Command>,
    generation: u64,
}

#[derive(Default)]
struct Shards {
    senders: HashMap<String, ShardEntry>,
    next_generation: u64,
    closed: bool,
}

/// Attempts a hub call makes before giving up on a retiring shard.
const SHARD_ATTEMPTS: usize = 3;

/// Spawns presence shards on demand and routes calls to them.
///
/// A shard retires once its last session detaches; its state lives on in
/// the presence store and is restored when the user comes back.
pub struct PresenceHub {
    shards: Arc<Mutex<Shards>>,
    store: Arc<dyn PresenceStore>,
    cache: Arc<dyn KvCache>,
    config: EngineConfig,
}

/// The shard a `userId` parameter selects.
fn shard_key(user_id: Option<&str>) -> &str {
    user_id.filter(|u| !u.is_empty()).unwrap_or(ANONYMOUS_SHARD)
}

impl PresenceHub {
    /// Create a hub. Shards start on first use.
    #[must_use]
    pub fn new(
        store: Arc<dyn PresenceStore>,
        cache: Arc<dyn KvCache>,
        config: EngineConfig,
    ) -> Self {
        Self {
            shards: Arc::new(Mutex::new(Shards::default())),
            store,
            cache,
            config,
        }
    }

    fn shard(&self, key: &str) -> Result<mpsc::Sender<Command>> {
        let mut shards = self.shards.lock();
        if shards.closed {
            return Err(stopped());
        }
        if let Some(entry) = shards.senders.get(key).filter(|e| !e.tx.is_closed()) {
            return Ok(entry.tx.clone());
        }

        let generation = shards.next_generation;
        shards.next_generation += 1;
        let (tx, rx) = mpsc::channel(self.config.shard_mailbox.max(1));
        let tracker = PresenceTracker::restore(
            key,
            Arc::clone(&self.store),
            Arc::clone(&self.cache),
            self.config.presence_ttl(),
        );
        let slot = ShardSlot {
            key: key.to_string(),
            generation,
            shards: Arc::clone(&self.shards),
        };
        tokio::spawn(run(slot, tracker, rx));
        tracing::debug!(shard = key, "Spawned presence shard");
        shards.senders.insert(
            key.to_string(),
            ShardEntry {
                tx: tx.clone(),
                generation,
            },
        );
        Ok(tx)
    }

    /// Send a request to the shard for `key` and wait for the reply,
    /// retrying on a fresh shard if the one reached retired first.
    async fn request<T>(
        &self,
        key: &str,
        command: impl Fn(oneshot::Sender<T>) -> Command,
    ) -> Result<(T, mpsc::Sender<Command>)> {
        for _ in 0..SHARD_ATTEMPTS {
            let tx = self.shard(key)?;
            let (reply, response) = oneshot::channel();
            if tx.send(command(reply)).await.is_err() {
                continue;
            }
            if let Ok(value) = response.await {
                return Ok((value, tx));
            }
        }
        Err(stopped())
    }

    /// Attach a socket for `user_id` (`None` for an anonymous socket).
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Internal` if the hub has shut down.
    pub async fn connect(
        &self,
        user_id: Option<String>,
    ) -> Result<(PresenceSession, mpsc::Receiver<Outbound>)> {
        let user_id = user_id.filter(|u| !u.is_empty());
        let (handle, outbound) = ConnectionHandle::channel(self.config.session_buffer);
        let (id, tx) = self
            .request(shard_key(user_id.as_deref()), |reply| Command::Connect {
                handle: handle.clone(),
                user_id: user_id.clone(),
                reply,
            })
            .await?;
        Ok((
            PresenceSession {
                id,
                tx,
                closed: false,
            },
            outbound,
        ))
    }

    /// Update the status of `user_id` in its own shard.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if the shard has never seen the user.
    pub async fn update_status(
        &self,
        user_id: Option<&str>,
        status: PresenceStatus,
        metadata: Option<PresenceMetadata>,
    ) -> Result<PresenceUser> {
        let key = shard_key(user_id);
        let (result, _) = self
            .request(key, |reply| Command::UpdateStatus {
                user_id: key.to_string(),
                status,
                metadata: metadata.clone(),
                reply,
            })
            .await?;
        result
    }

    /// Close every session of `user_id`. Returns how many were closed.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Internal` if the hub has shut down.
    pub async fn disconnect_user(&self, user_id: Option<&str>) -> Result<usize> {
        let key = shard_key(user_id);
        let (count, _) = self
            .request(key, |reply| Command::DisconnectUser {
                user_id: key.to_string(),
                reply,
            })
            .await?;
        Ok(count)
    }

    async fn cached_users(&self) -> Result<Vec<PresenceUser>> {
        let mut merged: HashMap<String, PresenceUser> = HashMap::new();
        for key in self.cache.list(CACHE_PREFIX).await? {
            let Some(snapshot) = self.cache.get(&key).await? else {
                continue;
            };
            let users: Vec<PresenceUser> = match serde_json::from_str(&snapshot) {
                Ok(users) => users,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable presence snapshot");
                    continue;
                }
            };
            for user in users {
                match merged.get(&user.id) {
                    Some(existing) if existing.last_seen >= user.last_seen => {}
                    _ => {
                        merged.insert(user.id.clone(), user);
                    }
                }
            }
        }
        let mut users: Vec<_> = merged.into_values().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    fn seen_recently(&self, user: &PresenceUser) -> bool {
        let ttl = chrono::Duration::seconds(
            i64::try_from(self.config.presence_ttl_seconds).unwrap_or(i64::MAX),
        );
        Utc::now() - user.last_seen < ttl
    }

    /// Users that are not offline and were seen within the TTL, read from
    /// the cache snapshots of every shard.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable.
    pub async fn online_users(&self) -> Result<OnlineUsers> {
        let all = self.cached_users().await?;
        let total = all.len();
        let users: Vec<_> = all
            .into_iter()
            .filter(|u| u.status != PresenceStatus::Offline && self.seen_recently(u))
            .collect();
        Ok(OnlineUsers {
            count: users.len(),
            users,
            total,
        })
    }

    /// One user's cached presence.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if no live snapshot mentions the user.
    pub async fn user_presence(&self, user_id: &str) -> Result<UserPresence> {
        let user = self
            .cached_users()
            .await?
            .into_iter()
            .find(|u| u.id == user_id)
            .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))?;
        Ok(UserPresence {
            is_online: self.seen_recently(&user),
            last_seen_ago: (Utc::now() - user.last_seen).num_milliseconds(),
            user,
        })
    }

    #[cfg(test)]
    fn shard_count(&self) -> usize {
        self.shards.lock().senders.len()
    }

    /// Close every socket and stop every shard. Later calls fail.
    pub async fn shutdown(&self) {
        let senders: Vec<_> = {
            let mut shards = self.shards.lock();
            shards.closed = true;
            shards.senders.drain().map(|(_, entry)| entry.tx).collect()
        };
        for tx in senders {
            let (reply, response) = oneshot::channel();
            if tx.send(Command::Shutdown { reply }).await.is_ok() {
                let _ = response.await;
            }
        }
        tracing::info!("Presence shards stopped");
    }
}

/// One socket's link to its presence shard.
///
/// Dropping the session disconnects it.
pub struct PresenceSession {
    id: SessionId,
    tx: mpsc::Sender<Command>,
    closed: bool,
}

impl PresenceSession {
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
            tracing::debug!(session = %self.id, "Presence shard stopped, frame dropped");
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

impl Drop for PresenceSession {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.tx.try_send(Command::Disconnect {
                session_id: self.id,
            });
        }
    }
}
