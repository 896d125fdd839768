//! Key-value cache with per-entry TTL.
//!
//! Presence snapshots are published here so that read paths (online users,
//! single-user lookups) never have to reach into a presence shard.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::error::Result;

/// A key-value cache whose entries may expire.
#[async_trait]
pub trait KvCache: Send + Sync {
    /// Get a live value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous one. `ttl` of `None` never expires.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List live keys starting with `prefix`, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process [`KvCache`].
///
/// Expired entries are invisible immediately and purged on the next write.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryKv {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(entries: &mut BTreeMap<String, Entry>, now: Instant) {
        entries.retain(|_, entry| entry.is_live(now));
    }
}

#[async_trait]
impl KvCache for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        Self::purge_expired(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
