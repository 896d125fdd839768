//! Collection engine, realtime fan-out and presence for flarebase.
//!
//! This crate holds the stateful core: user-defined collections reflected
//! as SQL tables, record CRUD with filtering and paging, change
//! notification over WebSocket, presence tracking and file storage.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway (HTTP/WS)                       │
//! └─────────────────────────────────────────────────────────────┘
//!        │                    │                     │
//!        ▼                    ▼                     ▼
//! ┌──────────────────┐ ┌──────────────┐ ┌─────────────────────┐
//! │  EngineService   │ │ RealtimeHub  │ │    PresenceHub      │
//! │ ┌──────────────┐ │ │  (1 shard)   │ │ (1 shard per user)  │
//! │ │SchemaRegistry│ │ │ Connection   │ │  PresenceTracker    │
//! │ │ RecordStore ─┼─┼─▶ Registry     │ │                     │
//! │ └──────────────┘ │ └──────────────┘ └─────────────────────┘
//! └──────────────────┘                       │          │
//!        │          FileService              ▼          ▼
//!        ▼              │  │          ┌──────────┐ ┌─────────┐
//!  ┌──────────┐         │  └────────▶ │BlobStore │ │ KvCache │
//!  │ SqlStore │ ◀───────┘             └──────────┘ └─────────┘
//!  └──────────┘                       PresenceStore (RocksDB)
//! ```
//!
//! Shards are tokio tasks that own their state and are driven through a
//! mailbox, so no two commands for the same shard ever run concurrently.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use flarebase_engine::{
//!     CollectionEngine, CreateCollectionRequest, EngineConfig, EngineService, RealtimeHub,
//! };
//! use flarebase_store::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let sql = Arc::new(SqliteStore::open("/tmp/flarebase.db").await?);
//! let realtime = RealtimeHub::spawn(&config);
//! let engine = EngineService::init(sql, Arc::new(realtime), config).await?;
//!
//! let posts = engine
//!     .create_collection(CreateCollectionRequest::new(
//!         "posts",
//!         r#"{"properties":{"title":{"type":"string"}}}"#,
//!     ))
//!     .await?;
//! println!("Created collection: {}", posts.id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod connection;
pub mod error;
pub mod events;
pub mod files;
pub mod presence;
pub mod protocol;
pub mod query;
pub mod realtime;
pub mod records;
pub mod schema;
pub mod service;
pub mod types;

#[cfg(test)]
mod testing;

pub use connection::{ConnectionHandle, Outbound, SendError};
pub use error::{EngineError, Result};
pub use events::{EventPublisher, RealtimeEvent, RecordAction};
pub use files::{FileDownload, FileRecord, FileService, FileStorage, UploadRequest};
pub use presence::{OnlineUsers, PresenceHub, PresenceSession, UserPresence};
pub use protocol::ProtocolError;
pub use realtime::{RealtimeHub, RealtimeSession, RealtimeStats};
pub use service::{CollectionEngine, EngineService, Fields};
pub use types::{
    Collection, CreateCollectionRequest, EngineConfig, ListQuery, ListResponse,
    UpdateCollectionRequest,
};

// Re-export commonly used types from dependencies for convenience
pub use flarebase_core::{FieldValue, Record, SessionId};
pub use flarebase_store::{PresenceMetadata, PresenceStatus, PresenceUser};
