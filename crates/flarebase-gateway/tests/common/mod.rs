//! Common test utilities.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;

use flarebase_auth::MockJwtValidator;
use flarebase_engine::{
    EngineConfig, EngineService, FileService, PresenceHub, RealtimeHub,
};
use flarebase_gateway::{create_router, GatewayConfig, GatewayState};
use flarebase_store::{FsBlobStore, MemoryKv, RocksStore, SqliteStore};

/// Schema used by most record tests.
#[allow(dead_code)]
pub const POSTS_SCHEMA: &str =
    r#"{"properties":{"title":{"type":"string"},"views":{"type":"integer"}}}"#;

/// A gateway wired to in-memory and temporary stores.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub engine: Arc<EngineService<SqliteStore>>,
    pub realtime: RealtimeHub,
    pub presence: Arc<PresenceHub>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestApp {
    /// Build the full service graph with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(GatewayConfig::default()).await
    }

    /// Like [`TestApp::new`] with custom gateway settings.
    pub async fn with_config(gateway_config: GatewayConfig) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let config = EngineConfig::default();

        let sql = Arc::new(
            SqliteStore::in_memory()
                .await
                .expect("Failed to open SQLite"),
        );
        let realtime = RealtimeHub::spawn(&config);
        let engine = Arc::new(
            EngineService::init(Arc::clone(&sql), Arc::new(realtime.clone()), config.clone())
                .await
                .expect("Failed to init engine"),
        );

        let blobs = Arc::new(
            FsBlobStore::new(temp_dir.path().join("blobs"))
                .await
                .expect("Failed to create blob store"),
        );
        let files = FileService::new(sql, blobs, config.clone());
        files.migrate().await.expect("Failed to migrate files");

        let presence_store = Arc::new(
            RocksStore::open(temp_dir.path().join("presence")).expect("Failed to open RocksDB"),
        );
        let presence = Arc::new(PresenceHub::new(
            presence_store,
            Arc::new(MemoryKv::new()),
            config,
        ));

        let state = GatewayState::new(
            Arc::clone(&engine),
            Arc::new(MockJwtValidator::default()),
            realtime.clone(),
            Arc::clone(&presence),
            Arc::new(files),
            gateway_config,
        );

        Self {
            router: create_router(state),
            engine,
            realtime,
            presence,
            _temp_dir: temp_dir,
        }
    }

    /// An in-process test client.
    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }

    /// Serve on an ephemeral local port, for socket tests.
    pub async fn listen(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to read local address");
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });
        addr
    }
}

/// `Authorization` header for `user`.
#[allow(dead_code)]
pub fn bearer(user: &str) -> (HeaderName, HeaderValue) {
    (
        axum::http::header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer test-token:{user}")).expect("valid header"),
    )
}
