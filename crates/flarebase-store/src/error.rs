//! Error types for the storage layer.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("record not found")]
    NotFound,

    /// A `RocksDB` error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// A SQL statement failed.
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),

    /// A filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A blob path is unsafe (absolute, or escapes the storage root).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Returns true if a SQL statement violated a UNIQUE or PRIMARY KEY constraint.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Sql(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }

    /// Returns true if retrying the same operation may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Sql(e) => matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)),
            Self::Io(_) | Self::Database(_) => true,
            Self::NotFound | Self::InvalidKey(_) | Self::Serialization(_) => false,
        }
    }
}
