//! Test doubles for the storage seams.

use async_trait::async_trait;
use flarebase_core::{FieldValue, Record};
use flarebase_store::{Result, SqlStore, SqliteStore, StoreError};
use parking_lot::Mutex;

/// An in-memory [`SqliteStore`] that can be told to reject statements.
///
/// Once armed with [`fail_on`](Self::fail_on), every `execute` whose SQL
/// starts with the prefix fails without reaching the database.
pub struct FailingSql {
    inner: SqliteStore,
    fail_prefix: Mutex<Option<String>>,
}

impl FailingSql {
    pub async fn new() -> Self {
        Self {
            inner: SqliteStore::in_memory().await.unwrap(),
            fail_prefix: Mutex::new(None),
        }
    }

    pub fn fail_on(&self, prefix: &str) {
        *self.fail_prefix.lock() = Some(prefix.to_string());
    }

    pub fn heal(&self) {
        *self.fail_prefix.lock() = None;
    }

    pub async fn table_exists(&self, name: &str) -> bool {
        self.inner
            .query_one(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[name.into()],
            )
            .await
            .unwrap()
            .is_some()
    }
}

#[async_trait]
impl SqlStore for FailingSql {
    async fn execute(&self, sql: &str, params: &[FieldValue]) -> Result<u64> {
        let armed = self
            .fail_prefix
            .lock()
            .as_deref()
            .is_some_and(|prefix| sql.starts_with(prefix));
        if armed {
            return Err(StoreError::Database(format!("rejected: {sql}")));
        }
        self.inner.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[FieldValue]) -> Result<Vec<Record>> {
        self.inner.query(sql, params).await
    }
}
