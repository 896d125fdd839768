//! Request and response types for engine operations.
//!
//! These types define the API contracts for collections, records and listings.

use std::time::Duration;

use flarebase_core::{FieldValue, Record};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// A registered collection.
///
/// `schema` is the JSON text the collection was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Opaque collection ID.
    pub id: String,
    /// Unique name, also the physical table name.
    pub name: String,
    /// JSON-Schema-like document describing the fields.
    pub schema: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last modification timestamp.
    pub updated_at: String,
}

impl Collection {
    /// Build from a `collections` registry row.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Internal` if a column is missing or not text.
    pub fn from_row(row: &Record) -> Result<Self> {
        let text = |column: &str| -> Result<String> {
            row.get(column)
                .and_then(FieldValue::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    EngineError::Internal(format!("collections row missing column {column}"))
                })
        };

        Ok(Self {
            id: text("id")?,
            name: text("name")?,
            schema: text("schema")?,
            created_at: text("created_at")?,
            updated_at: text("updated_at")?,
        })
    }
}

/// Request to create a new collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCollectionRequest {
    /// Collection name, `[a-z0-9_]{1,50}`.
    pub name: String,
    /// Schema document as JSON text.
    pub schema: String,
}

impl CreateCollectionRequest {
    /// Create a new request.
    #[must_use]
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
        }
    }
}

/// Request to update a collection's registry entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCollectionRequest {
    /// New name, if renaming.
    #[serde(default)]
    pub name: Option<String>,
    /// New schema text, if replacing.
    #[serde(default)]
    pub schema: Option<String>,
}

/// Listing parameters as they arrive from a query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// 1-based page number.
    #[serde(default)]
    pub page: Option<u32>,
    /// Page size.
    #[serde(default)]
    pub per_page: Option<u32>,
    /// Sort column, `-` prefix for descending.
    #[serde(default)]
    pub sort: Option<String>,
    /// Equality filter, `field=value,field2=value2`.
    #[serde(default)]
    pub filter: Option<String>,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Items matching the filter across all pages.
    pub total: u64,
    /// This page number.
    pub page: u32,
    /// Page size used.
    pub per_page: u32,
    /// `ceil(total / per_page)`.
    pub total_pages: u64,
}

impl<T> ListResponse<T> {
    /// Assemble a page, deriving `total_pages`.
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, page: u32, per_page: u32) -> Self {
        Self {
            items,
            total,
            page,
            per_page,
            total_pages: total.div_ceil(u64::from(per_page.max(1))),
        }
    }
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Page size when a listing does not ask for one.
    pub default_per_page: u32,
    /// Upper bound on page size.
    pub max_per_page: u32,
    /// Presence cache TTL and online cutoff (seconds).
    pub presence_ttl_seconds: u64,
    /// Outbound frames queued per socket before sends to it fail.
    pub session_buffer: usize,
    /// Commands queued per shard task.
    pub shard_mailbox: usize,
}

impl EngineConfig {
    /// Presence TTL as a `Duration`.
    #[must_use]
    pub const fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_seconds)
    }

    /// Resolve page and page size from a listing request.
    #[must_use]
    pub fn paging(&self, page: Option<u32>, per_page: Option<u32>) -> (u32, u32) {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page
            .unwrap_or(self.default_per_page)
            .clamp(1, self.max_per_page.max(1));
        (page, per_page)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_per_page: 20,
            max_per_page: 100,
            presence_ttl_seconds: 300, // 5 minutes
            session_buffer: 256,
            shard_mailbox: 1024,
        }
    }
}
