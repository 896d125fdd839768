//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the gateway API.

pub mod collections;
pub mod health;
pub mod presence;
pub mod realtime;
pub mod records;
pub mod storage;
pub mod ws;
