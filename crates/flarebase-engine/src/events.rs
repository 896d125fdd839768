//! Record change events.
//!
//! The record store emits one [`RealtimeEvent`] after every committed write;
//! an [`EventPublisher`] delivers it to realtime subscribers.

use async_trait::async_trait;
use flarebase_core::{now_timestamp, Record};
use serde::{Deserialize, Serialize};

/// The kind of change a record went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordAction {
    /// A record was inserted.
    Create,
    /// A record was modified.
    Update,
    /// A record was removed.
    Delete,
}

/// A change notification for subscribers of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// What happened.
    pub action: RecordAction,
    /// Collection the record belongs to.
    pub collection: String,
    /// The record after the change. Absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    /// The record ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// When the event was produced.
    pub timestamp: String,
}

impl RealtimeEvent {
    /// A `create` or `update` event carrying the full record.
    #[must_use]
    pub fn changed(action: RecordAction, collection: impl Into<String>, record: Record) -> Self {
        let id = record
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Self {
            action,
            collection: collection.into(),
            record: Some(record),
            id,
            timestamp: now_timestamp(),
        }
    }

    /// A `delete` event carrying only the ID.
    #[must_use]
    pub fn deleted(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            action: RecordAction::Delete,
            collection: collection.into(),
            record: None,
            id: Some(id.into()),
            timestamp: now_timestamp(),
        }
    }
}

/// Delivers events to subscribers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event, returning how many sessions received it.
    ///
    /// Publishing never fails from the caller's point of view; delivery
    /// problems are handled (and logged) by the publisher.
    async fn publish(&self, event: RealtimeEvent) -> usize;
}
