//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use flarebase_auth::JwtValidator;
use flarebase_engine::{CollectionEngine, FileStorage, PresenceHub, RealtimeHub};

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
///
/// This struct holds references to all services needed by the HTTP handlers.
pub struct GatewayState<E, V>
where
    E: CollectionEngine,
    V: JwtValidator,
{
    /// Collections and records.
    pub engine: Arc<E>,
    /// The JWT validator for authentication.
    pub jwt_validator: Arc<V>,
    /// Realtime subscriptions.
    pub realtime: RealtimeHub,
    /// Presence shards.
    pub presence: Arc<PresenceHub>,
    /// File storage.
    pub files: Arc<dyn FileStorage>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<E, V> GatewayState<E, V>
where
    E: CollectionEngine,
    V: JwtValidator,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(
        engine: Arc<E>,
        jwt_validator: Arc<V>,
        realtime: RealtimeHub,
        presence: Arc<PresenceHub>,
        files: Arc<dyn FileStorage>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            engine,
            jwt_validator,
            realtime,
            presence,
            files,
            config,
        }
    }
}

impl<E, V> Clone for GatewayState<E, V>
where
    E: CollectionEngine,
    V: JwtValidator,
{
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            jwt_validator: Arc::clone(&self.jwt_validator),
            realtime: self.realtime.clone(),
            presence: Arc::clone(&self.presence),
            files: Arc::clone(&self.files),
            config: self.config.clone(),
        }
    }
}
