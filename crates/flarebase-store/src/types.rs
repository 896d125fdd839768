//! Domain types stored in the database.
//!
//! These types represent the persisted presence state of users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Free-form metadata a client attaches to its presence entry.
pub type PresenceMetadata = serde_json::Map<String, serde_json::Value>;

/// A user's presence as tracked by one presence shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    /// User identifier.
    pub id: String,
    /// Current status.
    pub status: PresenceStatus,
    /// Last time the user was seen.
    pub last_seen: DateTime<Utc>,
    /// Client-supplied metadata, shallow-merged on each status update.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: PresenceMetadata,
}

impl PresenceUser {
    /// A new online user seen now.
    #[must_use]
    pub fn online(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: PresenceStatus::Online,
            last_seen: Utc::now(),
            metadata: PresenceMetadata::new(),
        }
    }

    /// Record activity now.
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}

/// Presence status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Connected and active.
    Online,
    /// Connected but idle.
    Away,
    /// Connected, do not disturb.
    Busy,
    /// No live session.
    Offline,
}

impl PresenceStatus {
    /// The wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "away" => Ok(Self::Away),
            "busy" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            other => Err(format!("unknown presence status: {other}")),
        }
    }
}
