//! Core types and utilities for flarebase.
//!
//! This crate provides the foundational types used throughout the flarebase backend:
//!
//! - **Identifiers**: session IDs, generated object IDs and validated collection names
//! - **Values**: the dynamic `FieldValue`/`Record` model that collection rows are made of
//! - **Time**: the timestamp format shared by records, events and presence
//!
//! # Example
//!
//! ```
//! use flarebase_core::{CollectionName, FieldValue, Record, SessionId};
//!
//! let name = CollectionName::parse("posts").unwrap();
//! assert_eq!(name.as_str(), "posts");
//!
//! let mut record = Record::new();
//! record.insert("title".to_string(), FieldValue::from("Hi"));
//!
//! let session_id = SessionId::generate();
//! assert_eq!(session_id.to_string().len(), 36);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;
pub mod time;
pub mod value;

pub use ids::{
    generate_object_id, is_identifier, CollectionName, IdError, SessionId, MAX_COLLECTION_NAME_LEN,
};
pub use time::{now_timestamp, Timestamp};
pub use value::{FieldValue, Record};
