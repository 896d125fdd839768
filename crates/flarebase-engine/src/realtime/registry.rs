//! Connection Registry for the realtime shard.

use std::collections::{BTreeMap, HashMap, HashSet};

use flarebase_core::{now_timestamp, SessionId};
use serde::Serialize;

use crate::connection::ConnectionHandle;
use crate::events::RealtimeEvent;
use crate::realtime::protocol::{ClientMessage, ServerMessage};

struct Session {
    handle: ConnectionHandle,
    collections: HashSet<String>,
}

/// Snapshot of the realtime shard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeStats {
    /// Live sessions.
    pub total_connections: usize,
    /// Subscriber count per collection.
    pub subscriptions_by_collection: BTreeMap<String, usize>,
}

/// Sessions and subscriptions of one shard.
///
/// Subscriptions refer to sessions by ID only; a collection entry exists
/// only while it has at least one subscriber.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<SessionId, Session>,
    subscriptions: HashMap<String, HashSet<SessionId>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket and send it the welcome frame.
    pub fn connect(&mut self, handle: ConnectionHandle) -> SessionId {
        let session_id = SessionId::generate();
        let welcome = ServerMessage::Connected {
            session_id,
            timestamp: now_timestamp(),
        };
        self.sessions.insert(
            session_id,
            Session {
                handle,
                collections: HashSet::new(),
            },
        );
        tracing::debug!(session = %session_id, "Realtime session connected");
        self.reply(session_id, &welcome);
        session_id
    }

    /// Handle one text frame from a session.
    pub fn handle_message(&mut self, session_id: SessionId, text: &str) {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            tracing::debug!(session = %session_id, "Frame for unknown session");
            return;
        };

        let reply = match ClientMessage::parse(text) {
            Ok(ClientMessage::Subscribe { collection }) => {
                session.collections.insert(collection.clone());
                self.subscriptions
                    .entry(collection.clone())
                    .or_default()
                    .insert(session_id);
                ServerMessage::Subscribed {
                    collection,
                    timestamp: now_timestamp(),
                }
            }
            Ok(ClientMessage::Unsubscribe { collection }) => {
                session.collections.remove(&collection);
                self.unsubscribe(session_id, &collection);
                ServerMessage::Unsubscribed {
                    collection,
                    timestamp: now_timestamp(),
                }
            }
            Ok(ClientMessage::Ping) => ServerMessage::Pong {
                timestamp: now_timestamp(),
            },
            Err(e) => ServerMessage::Error {
                message: e.to_string(),
            },
        };
        self.reply(session_id, &reply);
    }

    /// Remove a session and all of its subscriptions.
    ///
    /// Returns false if the session was not registered.
    pub fn disconnect(&mut self, session_id: SessionId) -> bool {
        let Some(session) = self.sessions.remove(&session_id) else {
            return false;
        };
        for collection in &session.collections {
            self.unsubscribe(session_id, collection);
        }
        tracing::debug!(session = %session_id, "Realtime session disconnected");
        true
    }

    fn unsubscribe(&mut self, session_id: SessionId, collection: &str) {
        if let Some(subscribers) = self.subscriptions.get_mut(collection) {
            subscribers.remove(&session_id);
            if subscribers.is_empty() {
                self.subscriptions.remove(collection);
            }
        }
    }

    fn reply(&mut self, session_id: SessionId, frame: &ServerMessage) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };
        if let Err(e) = session.handle.send_json(frame) {
            tracing::warn!(session = %session_id, error = %e, "Reply failed, dropping session");
            self.disconnect(session_id);
        }
    }

    /// Deliver an event to every subscriber of its collection.
    ///
    /// Sessions whose socket is closed or whose queue is full are removed.
    /// Returns the number of sessions the event was queued for.
    pub fn publish(&mut self, event: &RealtimeEvent) -> usize {
        let Some(subscribers) = self.subscriptions.get(&event.collection) else {
            return 0;
        };
        let text = match serde_json::to_string(&ServerMessage::Event(event.clone())) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(collection = %event.collection, error = %e, "Failed to encode event");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for session_id in subscribers {
            let Some(session) = self.sessions.get(session_id) else {
                failed.push(*session_id);
                continue;
            };
            if !session.handle.is_open() {
                failed.push(*session_id);
                continue;
            }
            match session.handle.send_text(text.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e, "Event delivery failed");
                    failed.push(*session_id);
                }
            }
        }

        for session_id in failed {
            if !self.disconnect(session_id) {
                self.unsubscribe(session_id, &event.collection);
            }
        }
        delivered
    }

    /// Current connection and subscription counts.
    #[must_use]
    pub fn stats(&self) -> RealtimeStats {
        RealtimeStats {
            total_connections: self.sessions.len(),
            subscriptions_by_collection: self
                .subscriptions
                .iter()
                .map(|(collection, subscribers)| (collection.clone(), subscribers.len()))
                .collect(),
        }
    }

    /// Ask every socket to close and forget all sessions.
    pub fn close_all(&mut self) {
        for session in self.sessions.values() {
            session.handle.close();
        }
        self.sessions.clear();
        self.subscriptions.clear();
    }
}
