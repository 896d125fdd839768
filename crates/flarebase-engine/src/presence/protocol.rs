//! Presence socket frames.

use flarebase_core::SessionId;
use flarebase_store::{PresenceMetadata, PresenceStatus, PresenceUser};
use serde::{Deserialize, Serialize};

use crate::protocol::{parse_message, ProtocolError};

/// Frames a presence client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PresenceClientMessage {
    /// Change this user's status, optionally merging metadata.
    UpdateStatus {
        /// New status.
        status: PresenceStatus,
        /// Keys to merge into the user's metadata.
        #[serde(default)]
        metadata: Option<PresenceMetadata>,
    },
    /// Heartbeat.
    Ping,
    /// Ask for the shard's user list.
    GetUsers,
}

impl PresenceClientMessage {
    const TYPES: &'static [&'static str] = &["updateStatus", "ping", "getUsers"];

    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] describing what is wrong with the frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        parse_message(text, Self::TYPES)
    }
}

/// Frames the server sends on a presence socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PresenceServerMessage {
    /// Welcome frame with the shard's users.
    Connected {
        /// The user this socket is attributed to.
        user_id: String,
        /// The new session's ID.
        session_id: SessionId,
        /// Every user the shard knows.
        users: Vec<PresenceUser>,
        /// Server time.
        timestamp: String,
    },
    /// Reply to `ping`.
    Pong {
        /// Server time.
        timestamp: String,
    },
    /// Reply to `getUsers`.
    UserList {
        /// Every user the shard knows.
        users: Vec<PresenceUser>,
        /// Server time.
        timestamp: String,
    },
    /// The last client frame was rejected.
    Error {
        /// What went wrong.
        message: String,
    },
    /// A user came online.
    UserJoined {
        /// The user.
        user: PresenceUser,
        /// Server time.
        timestamp: String,
    },
    /// A user's status changed.
    StatusChange {
        /// The user after the change.
        user: PresenceUser,
        /// Server time.
        timestamp: String,
    },
    /// A user's last session closed.
    UserLeft {
        /// The user, now offline.
        user: PresenceUser,
        /// Server time.
        timestamp: String,
    },
}
