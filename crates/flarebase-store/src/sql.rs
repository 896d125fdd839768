//! SQL access for collection data.
//!
//! The engine issues dynamic SQL against tables created at runtime, so rows
//! are decoded by storage class into a [`Record`] rather than into typed
//! structs.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use flarebase_core::{FieldValue, Record};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Column, Pool, Row, Sqlite, TypeInfo, ValueRef};

use crate::error::Result;

/// A SQL-capable store with positional (`?`) parameters.
#[async_trait]
pub trait SqlStore: Send + Sync {
    /// Execute a statement, returning the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    async fn execute(&self, sql: &str, params: &[FieldValue]) -> Result<u64>;

    /// Run a query and return every row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn query(&self, sql: &str, params: &[FieldValue]) -> Result<Vec<Record>>;

    /// Run a query and return the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn query_one(&self, sql: &str, params: &[FieldValue]) -> Result<Option<Record>> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }
}

/// SQLite-backed [`SqlStore`].
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        Self::connect(opts).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot be initialised.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(opts).await
    }

    async fn connect(opts: SqliteConnectOptions) -> Result<Self> {
        // SQLite permits limited write concurrency, and every connection to
        // `:memory:` is its own database, so the pool holds exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[FieldValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            FieldValue::Null => query.bind(None::<String>),
            FieldValue::Bool(b) => query.bind(*b),
            FieldValue::Integer(i) => query.bind(*i),
            FieldValue::Real(f) => query.bind(*f),
            FieldValue::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Result<Record> {
    let mut record = Record::with_capacity(row.columns().len());

    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;

        let value = if raw.is_null() {
            FieldValue::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => FieldValue::Integer(row.try_get::<i64, _>(idx)?),
                "REAL" => FieldValue::Real(row.try_get::<f64, _>(idx)?),
                "BLOB" => FieldValue::Text(
                    String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(idx)?).into_owned(),
                ),
                _ => FieldValue::Text(row.try_get::<String, _>(idx)?),
            }
        };

        record.insert(column.name().to_string(), value);
    }

    Ok(record)
}

#[async_trait]
impl SqlStore for SqliteStore {
    async fn execute(&self, sql: &str, params: &[FieldValue]) -> Result<u64> {
        tracing::trace!(sql, params = params.len(), "execute");
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str, params: &[FieldValue]) -> Result<Vec<Record>> {
        tracing::trace!(sql, params = params.len(), "query");
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;

    async fn store_with_table() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .execute(
                "CREATE TABLE items (id TEXT PRIMARY KEY, qty INTEGER, price INTEGER, note TEXT, flag INTEGER)",
                &[],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn execute_reports_rows_affected() {
        let store = store_with_table().await;
        let n = store
            .execute(
                "INSERT INTO items (id, qty) VALUES (?, ?), (?, ?)",
                &["a".into(), 1_i64.into(), "b".into(), 2_i64.into()],
            )
            .await
            .unwrap();
        assert_eq!(n, 2);

        let n = store
            .execute("DELETE FROM items WHERE qty > ?", &[0_i64.into()])
            .await
            .unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn rows_decode_by_storage_class_in_column_order() {
        let store = store_with_table().await;
        store
            .execute(
                "INSERT INTO items (id, qty, price, note, flag) VALUES (?, ?, ?, ?, ?)",
                &[
                    "a".into(),
                    FieldValue::Integer(3),
                    FieldValue::Real(2.5),
                    FieldValue::Null,
                    FieldValue::Bool(true),
                ],
            )
            .await
            .unwrap();

        let row = store
            .query_one("SELECT * FROM items WHERE id = ?", &["a".into()])
            .await
            .unwrap()
            .unwrap();

        let columns: Vec<_> = row.keys().map(String::as_str).collect();
        assert_eq!(columns, ["id", "qty", "price", "note", "flag"]);
        assert_eq!(row["id"], FieldValue::from("a"));
        assert_eq!(row["qty"], FieldValue::Integer(3));
        // INTEGER affinity keeps a non-integral real as REAL.
        assert_eq!(row["price"], FieldValue::Real(2.5));
        assert_eq!(row["note"], FieldValue::Null);
        assert_eq!(row["flag"], FieldValue::Integer(1));
    }

    #[tokio::test]
    async fn query_one_none_when_empty() {
        let store = store_with_table().await;
        let row = store
            .query_one("SELECT * FROM items WHERE id = ?", &["missing".into()])
            .await
            .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn count_is_integer() {
        let store = store_with_table().await;
        store
            .execute("INSERT INTO items (id) VALUES (?)", &["a".into()])
            .await
            .unwrap();
        let row = store
            .query_one("SELECT COUNT(*) AS count FROM items", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["count"], FieldValue::Integer(1));
    }

    #[tokio::test]
    async fn bad_sql_is_an_error() {
        let store = store_with_table().await;
        let err = store
            .query("SELECT * FROM nope", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Sql(_)));
    }

    #[tokio::test]
    async fn open_creates_database_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("app.db");
        let store = SqliteStore::open(&path).await.unwrap();
        store.execute("CREATE TABLE t (x INTEGER)", &[]).await.unwrap();
        assert!(path.exists());
    }
}
