//! Storage collaborators for flarebase.
//!
//! Each backing service the engine depends on is a trait here, with one
//! concrete implementation:
//!
//! | Trait | Implementation | Backing |
//! |-------|----------------|---------|
//! | [`SqlStore`] | [`SqliteStore`] | `SQLite` via sqlx, holds collections and records |
//! | [`KvCache`] | [`MemoryKv`] | in-process map with TTL, holds presence snapshots |
//! | [`BlobStore`] | [`FsBlobStore`] | local filesystem, holds uploaded files |
//! | [`PresenceStore`] | [`RocksStore`] | `RocksDB`, durable per-shard presence state |
//!
//! # Example
//!
//! ```no_run
//! use flarebase_store::{PresenceStore, PresenceUser, RocksStore};
//!
//! let store = RocksStore::open("/tmp/flarebase-presence").unwrap();
//! store.put_presence("alice", &[PresenceUser::online("alice")]).unwrap();
//! let users = store.get_presence("alice").unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod blob;
pub mod error;
pub mod kv;
pub mod rocks;
pub mod schema;
pub mod sql;
pub mod types;

pub use blob::{BlobStore, FsBlobStore};
pub use error::{Result, StoreError};
pub use kv::{KvCache, MemoryKv};
pub use rocks::RocksStore;
pub use sql::{SqlStore, SqliteStore};
pub use types::{PresenceMetadata, PresenceStatus, PresenceUser};

/// Durable storage for presence shards.
///
/// Each shard persists its whole user map as one value; writes replace the
/// previous snapshot.
pub trait PresenceStore: Send + Sync {
    /// Load the snapshot of a shard, `None` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_presence(&self, shard: &str) -> Result<Option<Vec<PresenceUser>>>;

    /// Replace the snapshot of a shard.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_presence(&self, shard: &str, users: &[PresenceUser]) -> Result<()>;
}
