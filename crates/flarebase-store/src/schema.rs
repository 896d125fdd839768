//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Presence snapshots, keyed by presence shard name.
    pub const PRESENCE: &str = "presence";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::PRESENCE]
}

/// Encode the key of a presence shard snapshot.
#[must_use]
pub fn presence_key(shard: &str) -> Vec<u8> {
    shard.as_bytes().to_vec()
}
