//! Flarebase Gateway - HTTP/WebSocket API server
//!
//! This is the main entry point for the gateway service. It opens the
//! stores, builds the engine services once and serves them over HTTP.
//!
//! # Configuration
//!
//! - `LISTEN_ADDR` (default `0.0.0.0:8787`)
//! - `DATABASE_URL`: `SQLite` file for collections, records and file
//!   metadata (default `data/flarebase.db`)
//! - `DATA_DIR`: `RocksDB` directory for presence (default `data/presence`)
//! - `BLOB_DIR`: file contents (default `data/blobs`)
//! - `JWT_SECRET`: HMAC secret for bearer tokens
//!
//! # Dev Mode
//!
//! Build with `--features dev-mode` and set `DEV_MODE=true` to use a mock
//! JWT validator instead of `JWT_SECRET`.
//! Use tokens in format: `test-token:<user-id>`

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flarebase_auth::{AuthConfig, HmacJwtValidator, JwtValidator};
use flarebase_engine::{
    EngineConfig, EngineService, FileService, FileStorage, PresenceHub, RealtimeHub,
};
use flarebase_gateway::{create_router, GatewayConfig, GatewayState};
use flarebase_store::{FsBlobStore, MemoryKv, RocksStore, SqliteStore};

/// Services shared by every request.
struct Services {
    engine: Arc<EngineService<SqliteStore>>,
    realtime: RealtimeHub,
    presence: Arc<PresenceHub>,
    files: Arc<dyn FileStorage>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,flarebase=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Flarebase Gateway");

    // Load configuration from environment
    let gateway_config = GatewayConfig {
        listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8787".into()),
        ..GatewayConfig::default()
    };
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "data/flarebase.db".into());
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data/presence".into());
    let blob_dir = std::env::var("BLOB_DIR").unwrap_or_else(|_| "data/blobs".into());

    tracing::info!(
        listen_addr = %gateway_config.listen_addr,
        database_url = %database_url,
        data_dir = %data_dir,
        blob_dir = %blob_dir,
        "Gateway configuration loaded"
    );

    let engine_config = EngineConfig::default();

    tracing::info!(path = %database_url, "Opening SQLite store");
    let sql = Arc::new(SqliteStore::open(&database_url).await?);

    let realtime = RealtimeHub::spawn(&engine_config);
    let engine = Arc::new(
        EngineService::init(
            Arc::clone(&sql),
            Arc::new(realtime.clone()),
            engine_config.clone(),
        )
        .await?,
    );

    tracing::info!(path = %blob_dir, "Opening blob store");
    let blobs = Arc::new(FsBlobStore::new(&blob_dir).await?);
    let files = FileService::new(sql, blobs, engine_config.clone());
    files.migrate().await?;

    tracing::info!(path = %data_dir, "Opening RocksDB store");
    let presence_store = Arc::new(RocksStore::open(&data_dir)?);
    let presence = Arc::new(PresenceHub::new(
        presence_store,
        Arc::new(MemoryKv::new()),
        engine_config,
    ));

    let services = Services {
        engine,
        realtime,
        presence,
        files: Arc::new(files),
    };

    #[cfg(feature = "dev-mode")]
    if std::env::var("DEV_MODE").is_ok_and(|v| v == "true" || v == "1") {
        tracing::warn!("DEV MODE ENABLED - using mock JWT validator");
        tracing::warn!("Use tokens in format: test-token:<user-id>");
        let validator = Arc::new(flarebase_auth::MockJwtValidator::default());
        return serve(services, validator, gateway_config).await;
    }

    let secret = std::env::var("JWT_SECRET").map_err(|_| "JWT_SECRET must be set")?;
    let validator = Arc::new(HmacJwtValidator::new(AuthConfig::new(secret)));
    tracing::info!("JWT validator initialized");

    serve(services, validator, gateway_config).await
}

/// Serve until Ctrl-C, then close every socket.
async fn serve<V>(
    services: Services,
    jwt_validator: Arc<V>,
    config: GatewayConfig,
) -> Result<(), Box<dyn std::error::Error>>
where
    V: JwtValidator + 'static,
{
    let listen_addr = config.listen_addr.clone();
    let realtime = services.realtime.clone();
    let presence = Arc::clone(&services.presence);

    let state = GatewayState::new(
        services.engine,
        jwt_validator,
        services.realtime,
        services.presence,
        services.files,
        config,
    );
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown signal received, closing sockets");
            realtime.shutdown().await;
            presence.shutdown().await;
        })
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}
