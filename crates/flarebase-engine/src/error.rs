//! Error types for the engine.
//!
//! This module defines all errors that can occur while managing collections,
//! records, files and presence.

use flarebase_core::IdError;
use flarebase_store::StoreError;
use thiserror::Error;

use crate::protocol::ProtocolError;

/// A result type using `EngineError`.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested collection was not found.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// The requested record was not found.
    #[error("record {id} not found in collection {collection}")]
    RecordNotFound {
        /// The collection that was searched.
        collection: String,
        /// The missing record ID.
        id: String,
    },

    /// The requested presence user was not found.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// The requested file was not found.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// A collection with this name already exists.
    #[error("collection already exists: {0}")]
    DuplicateName(String),

    /// The collection schema is malformed or its table could not be created.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// The request failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A socket frame could not be understood.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<IdError> for EngineError {
    fn from(err: IdError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl EngineError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::CollectionNotFound(_)
            | Self::RecordNotFound { .. }
            | Self::UserNotFound(_)
            | Self::FileNotFound(_) => 404,
            Self::DuplicateName(_) => 409,
            Self::InvalidSchema(_) | Self::Validation(_) | Self::Protocol(_) => 400,
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retriable(),
            Self::Internal(_) => true,
            _ => false,
        }
    }

    /// Whether this error belongs to the not-found family.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.http_status_code() == 404
    }
}
