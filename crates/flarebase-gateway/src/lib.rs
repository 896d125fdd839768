//! HTTP and WebSocket gateway for flarebase.
//!
//! This crate provides the public-facing API of the backend. It handles:
//!
//! - JWT authentication of the collection and storage routes
//! - REST HTTP endpoints for collections, records and files
//! - Realtime and presence WebSocket sessions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                              │
//! │                   (HTTP / WebSocket)                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    flarebase-gateway                        │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │   Auth      │ │   Router    │ │    Socket           │    │
//! │  │  Extractor  │ │  + Handlers │ │    Bridge           │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌──────────────┬──────┴───────┬──────────────┐
//!        ▼              ▼              ▼              ▼
//!  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//!  │Collection│   │ Realtime │   │ Presence │   │  Files   │
//!  │  Engine  │   │   Hub    │   │   Hub    │   │          │
//!  └──────────┘   └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use flarebase_auth::{AuthConfig, HmacJwtValidator};
//! use flarebase_engine::{EngineConfig, EngineService, FileService, PresenceHub, RealtimeHub};
//! use flarebase_gateway::{create_router, GatewayConfig, GatewayState};
//! use flarebase_store::{FsBlobStore, MemoryKv, RocksStore, SqliteStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let sql = Arc::new(SqliteStore::open("/tmp/flarebase/flarebase.db").await?);
//! let realtime = RealtimeHub::spawn(&config);
//! let engine = Arc::new(
//!     EngineService::init(Arc::clone(&sql), Arc::new(realtime.clone()), config.clone()).await?,
//! );
//!
//! let files = FileService::new(sql, Arc::new(FsBlobStore::new("/tmp/flarebase/blobs").await?), config.clone());
//! files.migrate().await?;
//!
//! let presence = Arc::new(PresenceHub::new(
//!     Arc::new(RocksStore::open("/tmp/flarebase/presence")?),
//!     Arc::new(MemoryKv::new()),
//!     config,
//! ));
//! let jwt_validator = Arc::new(HmacJwtValidator::new(AuthConfig::new("secret")));
//!
//! let state = GatewayState::new(
//!     engine,
//!     jwt_validator,
//!     realtime,
//!     presence,
//!     Arc::new(files),
//!     GatewayConfig::default(),
//! );
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8787").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;

// Re-export key types for convenience
pub use auth::AuthUser;
