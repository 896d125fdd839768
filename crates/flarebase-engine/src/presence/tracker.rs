//! Presence Tracker: the state of one presence shard.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use flarebase_core::{now_timestamp, SessionId};
use flarebase_store::{KvCache, PresenceMetadata, PresenceStatus, PresenceStore, PresenceUser};

use crate::connection::ConnectionHandle;
use crate::error::{EngineError, Result};
use crate::presence::protocol::{PresenceClientMessage, PresenceServerMessage};

/// Prefix of every presence snapshot in the cache.
pub const CACHE_PREFIX: &str = "presence:users:";

/// Cache key holding a shard's user snapshot.
#[must_use]
pub fn cache_key(shard: &str) -> String {
    format!("{CACHE_PREFIX}{shard}")
}

struct Attached {
    handle: ConnectionHandle,
    user_id: String,
}

/// Users and sessions of one presence shard.
///
/// A user is set offline only when its last session detaches. Every
/// mutation is written to the durable store and to the cache; write
/// failures are logged and the in-memory state stands.
pub struct PresenceTracker {
    shard: String,
    users: BTreeMap<String, PresenceUser>,
    sessions: HashMap<SessionId, Attached>,
    store: Arc<dyn PresenceStore>,
    cache: Arc<dyn KvCache>,
    ttl: Duration,
}

impl PresenceTracker {
    /// Load a shard from the durable store.
    ///
    /// No sessions survive a restart, so restored users start offline.
    pub fn restore(
        shard: impl Into<String>,
        store: Arc<dyn PresenceStore>,
        cache: Arc<dyn KvCache>,
        ttl: Duration,
    ) -> Self {
        let shard = shard.into();
        let users = match store.get_presence(&shard) {
            Ok(users) => users.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(shard = %shard, error = %e, "Failed to restore presence, starting empty");
                Vec::new()
            }
        };
        let users = users
            .into_iter()
            .map(|mut user| {
                user.status = PresenceStatus::Offline;
                (user.id.clone(), user)
            })
            .collect();

        Self {
            shard,
            users,
            sessions: HashMap::new(),
            store,
            cache,
            ttl,
        }
    }

    /// Every user this shard knows, ordered by ID.
    #[must_use]
    pub fn users(&self) -> Vec<PresenceUser> {
        self.users.values().cloned().collect()
    }

    /// Number of attached sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn has_session(&self, user_id: &str) -> bool {
        self.sessions.values().any(|s| s.user_id == user_id)
    }

    /// Attach a socket for `user_id`, defaulting to `user_<sessionId>`.
    ///
    /// The user is forced online. Other sessions hear `userJoined` unless
    /// the user already had a live session here.
    pub async fn connect(
        &mut self,
        handle: ConnectionHandle,
        user_id: Option<String>,
    ) -> SessionId {
        let session_id = SessionId::generate();
        let user_id = user_id.unwrap_or_else(|| format!("user_{session_id}"));
        let rejoining = self.has_session(&user_id);

        let user = self
            .users
            .entry(user_id.clone())
            .or_insert_with(|| PresenceUser::online(user_id.clone()));
        user.status = PresenceStatus::Online;
        user.touch();
        let user = user.clone();

        self.sessions.insert(
            session_id,
            Attached {
                handle,
                user_id: user_id.clone(),
            },
        );
        self.persist().await;
        tracing::debug!(shard = %self.shard, user = %user_id, session = %session_id, "Presence session connected");

        let welcome = PresenceServerMessage::Connected {
            user_id,
            session_id,
            users: self.users(),
            timestamp: now_timestamp(),
        };
        if !self.reply(session_id, &welcome) {
            self.drop_sessions(vec![session_id]).await;
            return session_id;
        }

        if !rejoining {
            let joined = PresenceServerMessage::UserJoined {
                user,
                timestamp: now_timestamp(),
            };
            let failed = self.broadcast(&joined, Some(session_id));
            self.drop_sessions(failed).await;
        }
        session_id
    }

    /// Handle one text frame from a session.
    pub async fn handle_message(&mut self, session_id: SessionId, text: &str) {
        let Some(user_id) = self.sessions.get(&session_id).map(|s| s.user_id.clone()) else {
            tracing::debug!(shard = %self.shard, session = %session_id, "Frame for unknown session");
            return;
        };

        let reply = match PresenceClientMessage::parse(text) {
            Ok(PresenceClientMessage::UpdateStatus { status, metadata }) => {
                match self.update_status(&user_id, status, metadata).await {
                    Ok(_) => None,
                    Err(e) => Some(PresenceServerMessage::Error {
                        message: e.to_string(),
                    }),
                }
            }
            Ok(PresenceClientMessage::Ping) => {
                if let Some(user) = self.users.get_mut(&user_id) {
                    user.touch();
                }
                self.persist().await;
                Some(PresenceServerMessage::Pong {
                    timestamp: now_timestamp(),
                })
            }
            Ok(PresenceClientMessage::GetUsers) => Some(PresenceServerMessage::UserList {
                users: self.users(),
                timestamp: now_timestamp(),
            }),
            Err(e) => Some(PresenceServerMessage::Error {
                message: e.to_string(),
            }),
        };

        if let Some(reply) = reply {
            if !self.reply(session_id, &reply) {
                self.drop_sessions(vec![session_id]).await;
            }
        }
    }

    /// Set a user's status and merge metadata.
    ///
    /// `statusChange` is broadcast only when the status actually changes.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if the shard does not know the user, and
    /// `Validation` when asked to go offline while a session is still live.
    pub async fn update_status(
        &mut self,
        user_id: &str,
        status: PresenceStatus,
        metadata: Option<PresenceMetadata>,
    ) -> Result<PresenceUser> {
        if status == PresenceStatus::Offline && self.has_session(user_id) {
            return Err(EngineError::Validation(
                "cannot go offline while a session is connected".into(),
            ));
        }
        let user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))?;

        let previous = user.status;
        user.status = status;
        user.touch();
        if let Some(metadata) = metadata {
            user.metadata.extend(metadata);
        }
        let user = user.clone();
        self.persist().await;

        if previous != status {
            let change = PresenceServerMessage::StatusChange {
                user: user.clone(),
                timestamp: now_timestamp(),
            };
            let failed = self.broadcast(&change, None);
            self.drop_sessions(failed).await;
        }
        Ok(user)
    }

    /// Detach a session after its socket closed.
    pub async fn disconnect(&mut self, session_id: SessionId) {
        self.drop_sessions(vec![session_id]).await;
    }

    /// Close every session of a user. Returns how many were closed.
    pub async fn disconnect_user(&mut self, user_id: &str) -> usize {
        let sessions: Vec<_> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.user_id == user_id)
            .map(|(id, _)| *id)
            .collect();
        let count = sessions.len();
        self.drop_sessions(sessions).await;
        count
    }

    /// Close every socket without touching user state.
    pub fn close_all(&mut self) {
        for attached in self.sessions.values() {
            attached.handle.close();
        }
        self.sessions.clear();
    }

    /// Detach sessions; users left without one go offline and `userLeft`
    /// is broadcast. Sessions that fail to receive a broadcast are detached
    /// in turn.
    async fn drop_sessions(&mut self, sessions: Vec<SessionId>) {
        let mut pending = sessions;
        while let Some(session_id) = pending.pop() {
            let Some(attached) = self.sessions.remove(&session_id) else {
                continue;
            };
            attached.handle.close();
            tracing::debug!(shard = %self.shard, user = %attached.user_id, session = %session_id, "Presence session disconnected");

            if self.has_session(&attached.user_id) {
                continue;
            }
            let Some(user) = self.users.get_mut(&attached.user_id) else {
                continue;
            };
            user.status = PresenceStatus::Offline;
            user.touch();
            let user = user.clone();
            self.persist().await;

            let left = PresenceServerMessage::UserLeft {
                user,
                timestamp: now_timestamp(),
            };
            pending.extend(self.broadcast(&left, None));
        }
    }

    fn reply(&self, session_id: SessionId, frame: &PresenceServerMessage) -> bool {
        let Some(attached) = self.sessions.get(&session_id) else {
            return false;
        };
        match attached.handle.send_json(frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(shard = %self.shard, session = %session_id, error = %e, "Presence reply failed");
                false
            }
        }
    }

    /// Send a frame to every session except `exclude`; returns the sessions
    /// that could not take it.
    fn broadcast(
        &self,
        frame: &PresenceServerMessage,
        exclude: Option<SessionId>,
    ) -> Vec<SessionId> {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(shard = %self.shard, error = %e, "Failed to encode presence frame");
                return Vec::new();
            }
        };

        let mut failed = Vec::new();
        for (session_id, attached) in &self.sessions {
            if Some(*session_id) == exclude {
                continue;
            }
            if let Err(e) = attached.handle.send_text(text.clone()) {
                tracing::warn!(shard = %self.shard, session = %session_id, error = %e, "Presence broadcast failed");
                failed.push(*session_id);
            }
        }
        failed
    }

    async fn persist(&self) {
        let users = self.users();
        if let Err(e) = self.store.put_presence(&self.shard, &users) {
            tracing::warn!(shard = %self.shard, error = %e, "Failed to persist presence");
        }
        match serde_json::to_string(&users) {
            Ok(snapshot) => {
                if let Err(e) = self
                    .cache
                    .put(&cache_key(&self.shard), snapshot, Some(self.ttl))
                    .await
                {
                    tracing::warn!(shard = %self.shard, error = %e, "Failed to cache presence");
                }
            }
            Err(e) => {
                tracing::warn!(shard = %self.shard, error = %e, "Failed to encode presence snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;
    use flarebase_store::{MemoryKv, RocksStore};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct Fixture {
        tracker: PresenceTracker,
        store: Arc<RocksStore>,
        cache: Arc<MemoryKv>,
        _dir: TempDir,
    }

    fn setup(shard: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let cache = Arc::new(MemoryKv::new());
        let tracker = PresenceTracker::restore(
            shard,
            store.clone(),
            cache.clone(),
            Duration::from_secs(300),
        );
        Fixture {
            tracker,
            store,
            cache,
            _dir: dir,
        }
    }

    fn frames(rx: &mut mpsc::Receiver<Outbound>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Outbound::Text(text) = frame {
                out.push(serde_json::from_str(&text).unwrap());
            }
        }
        out
    }

    fn types(frames: &[serde_json::Value]) -> Vec<&str> {
        frames.iter().map(|f| f["type"].as_str().unwrap()).collect()
    }

    async fn connect(
        tracker: &mut PresenceTracker,
        user: &str,
    ) -> (SessionId, mpsc::Receiver<Outbound>) {
        let (handle, rx) = ConnectionHandle::channel(32);
        let id = tracker.connect(handle, Some(user.to_string())).await;
        (id, rx)
    }

    #[tokio::test]
    async fn connect_welcomes_and_announces() {
        let mut fx = setup("room");
        let (_a, mut rx_a) = connect(&mut fx.tracker, "alice").await;
        let welcome = frames(&mut rx_a);
        assert_eq!(types(&welcome), ["connected"]);
        assert_eq!(welcome[0]["userId"], "alice");
        assert_eq!(welcome[0]["users"][0]["status"], "online");

        let (_b, mut rx_b) = connect(&mut fx.tracker, "bob").await;
        assert_eq!(types(&frames(&mut rx_b)), ["connected"]);
        let joined = frames(&mut rx_a);
        assert_eq!(types(&joined), ["userJoined"]);
        assert_eq!(joined[0]["user"]["id"], "bob");
    }

    #[tokio::test]
    async fn anonymous_socket_gets_generated_user() {
        let mut fx = setup("anonymous");
        let (handle, mut rx) = ConnectionHandle::channel(8);
        let session = fx.tracker.connect(handle, None).await;
        let welcome = frames(&mut rx);
        assert_eq!(welcome[0]["userId"], format!("user_{session}"));
    }

    #[tokio::test]
    async fn second_session_joins_silently_and_keeps_user_online() {
        let mut fx = setup("room");
        let (_watcher, mut rx_w) = connect(&mut fx.tracker, "bob").await;
        let (a1, _rx1) = connect(&mut fx.tracker, "alice").await;
        let (a2, _rx2) = connect(&mut fx.tracker, "alice").await;
        frames(&mut rx_w);

        fx.tracker.disconnect(a1).await;
        assert!(frames(&mut rx_w).is_empty());
        let alice = fx.tracker.users().into_iter().find(|u| u.id == "alice").unwrap();
        assert_eq!(alice.status, PresenceStatus::Online);

        fx.tracker.disconnect(a2).await;
        let left = frames(&mut rx_w);
        assert_eq!(types(&left), ["userLeft"]);
        assert_eq!(left[0]["user"]["status"], "offline");
    }

    #[tokio::test]
    async fn reconnect_after_offline_announces_again() {
        let mut fx = setup("room");
        let (_watcher, mut rx_w) = connect(&mut fx.tracker, "bob").await;
        let (a, _rx) = connect(&mut fx.tracker, "alice").await;
        fx.tracker.disconnect(a).await;
        frames(&mut rx_w);

        let (_a, _rx) = connect(&mut fx.tracker, "alice").await;
        assert_eq!(types(&frames(&mut rx_w)), ["userJoined"]);
    }

    #[tokio::test]
    async fn status_change_only_when_different() {
        let mut fx = setup("room");
        let (_watcher, mut rx_w) = connect(&mut fx.tracker, "bob").await;
        let (a, mut rx_a) = connect(&mut fx.tracker, "alice").await;
        frames(&mut rx_w);
        frames(&mut rx_a);

        fx.tracker
            .handle_message(a, r#"{"type":"updateStatus","status":"online"}"#)
            .await;
        assert!(frames(&mut rx_w).is_empty());

        fx.tracker
            .handle_message(
                a,
                r#"{"type":"updateStatus","status":"busy","metadata":{"note":"meeting"}}"#,
            )
            .await;
        let change = frames(&mut rx_w);
        assert_eq!(types(&change), ["statusChange"]);
        assert_eq!(change[0]["user"]["status"], "busy");
        assert_eq!(change[0]["user"]["metadata"]["note"], "meeting");
        assert_eq!(types(&frames(&mut rx_a)), ["statusChange"]);
    }

    #[tokio::test]
    async fn metadata_merges_shallowly() {
        let mut fx = setup("room");
        let (_a, _rx) = connect(&mut fx.tracker, "alice").await;
        let first: PresenceMetadata =
            serde_json::from_str(r#"{"device":"phone","mood":"ok"}"#).unwrap();
        let second: PresenceMetadata = serde_json::from_str(r#"{"mood":"great"}"#).unwrap();

        fx.tracker
            .update_status("alice", PresenceStatus::Away, Some(first))
            .await
            .unwrap();
        let user = fx
            .tracker
            .update_status("alice", PresenceStatus::Away, Some(second))
            .await
            .unwrap();
        assert_eq!(user.metadata["device"], "phone");
        assert_eq!(user.metadata["mood"], "great");
    }

    #[tokio::test]
    async fn offline_refused_while_connected() {
        let mut fx = setup("room");
        let (a, mut rx) = connect(&mut fx.tracker, "alice").await;
        frames(&mut rx);

        fx.tracker
            .handle_message(a, r#"{"type":"updateStatus","status":"offline"}"#)
            .await;
        assert_eq!(types(&frames(&mut rx)), ["error"]);
        assert!(matches!(
            fx.tracker
                .update_status("ghost", PresenceStatus::Away, None)
                .await,
            Err(EngineError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn ping_and_get_users() {
        let mut fx = setup("room");
        let (a, mut rx) = connect(&mut fx.tracker, "alice").await;
        frames(&mut rx);

        fx.tracker.handle_message(a, r#"{"type":"ping"}"#).await;
        fx.tracker.handle_message(a, r#"{"type":"getUsers"}"#).await;
        fx.tracker.handle_message(a, "nope").await;
        fx.tracker.handle_message(a, r#"{"type":"subscribe"}"#).await;

        let replies = frames(&mut rx);
        assert_eq!(types(&replies), ["pong", "userList", "error", "error"]);
        assert_eq!(replies[1]["users"][0]["id"], "alice");
        assert_eq!(replies[2]["message"], "Invalid JSON format");
        assert_eq!(replies[3]["message"], "Unknown message type");
        assert_eq!(fx.tracker.session_count(), 1);
    }

    #[tokio::test]
    async fn failed_broadcast_disconnects_receiver() {
        let mut fx = setup("room");
        let (_a, rx_a) = connect(&mut fx.tracker, "alice").await;
        let (_b, mut rx_b) = connect(&mut fx.tracker, "bob").await;
        drop(rx_a);

        let (_c, _rx_c) = connect(&mut fx.tracker, "carol").await;
        assert_eq!(fx.tracker.session_count(), 2);

        let alice = fx.tracker.users().into_iter().find(|u| u.id == "alice").unwrap();
        assert_eq!(alice.status, PresenceStatus::Offline);
        let seen = frames(&mut rx_b);
        assert!(types(&seen).contains(&"userLeft"));
    }

    #[tokio::test]
    async fn disconnect_user_closes_all_sessions() {
        let mut fx = setup("room");
        let (_a1, mut rx1) = connect(&mut fx.tracker, "alice").await;
        let (_a2, _rx2) = connect(&mut fx.tracker, "alice").await;
        let (_b, _rx_b) = connect(&mut fx.tracker, "bob").await;

        assert_eq!(fx.tracker.disconnect_user("alice").await, 2);
        assert_eq!(fx.tracker.disconnect_user("alice").await, 0);
        assert_eq!(fx.tracker.session_count(), 1);

        let mut closed = false;
        while let Ok(frame) = rx1.try_recv() {
            closed |= frame == Outbound::Close;
        }
        assert!(closed);
    }

    #[tokio::test]
    async fn mutations_reach_store_and_cache() {
        let mut fx = setup("room");
        let (a, _rx) = connect(&mut fx.tracker, "alice").await;

        let stored = fx.store.get_presence("room").unwrap().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, PresenceStatus::Online);

        let cached = fx.cache.get(&cache_key("room")).await.unwrap().unwrap();
        let cached: Vec<PresenceUser> = serde_json::from_str(&cached).unwrap();
        assert_eq!(cached[0].id, "alice");

        fx.tracker.disconnect(a).await;
        let stored = fx.store.get_presence("room").unwrap().unwrap();
        assert_eq!(stored[0].status, PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn restore_marks_users_offline() {
        let fx = setup("room");
        fx.store
            .put_presence("room", &[PresenceUser::online("alice")])
            .unwrap();

        let tracker = PresenceTracker::restore(
            "room",
            fx.store.clone(),
            fx.cache.clone(),
            Duration::from_secs(300),
        );
        let users = tracker.users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].status, PresenceStatus::Offline);
    }
}
