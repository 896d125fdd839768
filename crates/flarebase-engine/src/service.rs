//! Engine service implementation.
//!
//! This module provides the `CollectionEngine` trait and `EngineService`
//! implementation that front the Schema Registry and the Record Store.

use std::sync::Arc;

use async_trait::async_trait;
use flarebase_core::Record;
use flarebase_store::SqlStore;

use crate::error::Result;
use crate::events::EventPublisher;
use crate::records::RecordStore;
use crate::schema::SchemaRegistry;
use crate::types::{
    Collection, CreateCollectionRequest, EngineConfig, ListQuery, ListResponse,
    UpdateCollectionRequest,
};

/// Field values as they arrive in a request body.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Trait defining the collection engine operations.
///
/// Record writes notify realtime subscribers after they commit.
#[async_trait]
pub trait CollectionEngine: Send + Sync {
    // =========================================================================
    // Collection Operations
    // =========================================================================

    /// Register a collection and create its table.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::DuplicateName` if the name is taken and
    /// `EngineError::InvalidSchema` if the schema is unusable.
    async fn create_collection(&self, request: CreateCollectionRequest) -> Result<Collection>;

    /// Get a collection by ID.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CollectionNotFound` if the ID is unknown.
    async fn get_collection(&self, id: &str) -> Result<Collection>;

    /// List all collections, newest first.
    async fn list_collections(&self) -> Result<Vec<Collection>>;

    /// Rename a collection and/or replace its schema text.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CollectionNotFound` if the ID is unknown.
    async fn update_collection(
        &self,
        id: &str,
        request: UpdateCollectionRequest,
    ) -> Result<Collection>;

    /// Drop a collection's table and registry entry.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CollectionNotFound` if the ID is unknown.
    async fn delete_collection(&self, id: &str) -> Result<()>;

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// List one page of records.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CollectionNotFound` for an unknown collection.
    async fn list_records(&self, collection: &str, query: &ListQuery)
        -> Result<ListResponse<Record>>;

    /// Get one record.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::RecordNotFound` if the ID is unknown.
    async fn get_record(&self, collection: &str, id: &str) -> Result<Record>;

    /// Insert a record and emit `create`.
    async fn create_record(&self, collection: &str, fields: Fields) -> Result<Record>;

    /// Update a record and emit `update`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::RecordNotFound` if the ID is unknown.
    async fn update_record(&self, collection: &str, id: &str, fields: Fields) -> Result<Record>;

    /// Delete a record and emit `delete`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::RecordNotFound` if the ID is unknown.
    async fn delete_record(&self, collection: &str, id: &str) -> Result<()>;
}

/// Implementation of the collection engine over a [`SqlStore`].
pub struct EngineService<S: SqlStore> {
    registry: SchemaRegistry<S>,
    records: RecordStore<S>,
}

impl<S: SqlStore> EngineService<S> {
    /// Create the service and run the registry migration.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry table cannot be created.
    pub async fn init(
        sql: Arc<S>,
        publisher: Arc<dyn EventPublisher>,
        config: EngineConfig,
    ) -> Result<Self> {
        let registry = SchemaRegistry::new(Arc::clone(&sql));
        registry.migrate().await?;
        let records = RecordStore::new(sql, registry.clone(), publisher, config);
        tracing::info!("Collection engine ready");
        Ok(Self { registry, records })
    }
}

#[async_trait]
impl<S: SqlStore + 'static> CollectionEngine for EngineService<S> {
    async fn create_collection(&self, request: CreateCollectionRequest) -> Result<Collection> {
        self.registry.create(request).await
    }

    async fn get_collection(&self, id: &str) -> Result<Collection> {
        self.registry.get(id).await
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        self.registry.list().await
    }

    async fn update_collection(
        &self,
        id: &str,
        request: UpdateCollectionRequest,
    ) -> Result<Collection> {
        self.registry.update(id, request).await
    }

    async fn delete_collection(&self, id: &str) -> Result<()> {
        self.registry.delete(id).await
    }

    async fn list_records(
        &self,
        collection: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<Record>> {
        self.records.list(collection, query).await
    }

    async fn get_record(&self, collection: &str, id: &str) -> Result<Record> {
        self.records.get(collection, id).await
    }

    async fn create_record(&self, collection: &str, fields: Fields) -> Result<Record> {
        self.records.create(collection, fields).await
    }

    async fn update_record(&self, collection: &str, id: &str, fields: Fields) -> Result<Record> {
        self.records.update(collection, id, fields).await
    }

    async fn delete_record(&self, collection: &str, id: &str) -> Result<()> {
        self.records.delete(collection, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::realtime::RealtimeHub;
    use crate::connection::Outbound;
    use flarebase_store::SqliteStore;
    use serde_json::json;

    async fn create_service(hub: &RealtimeHub) -> EngineService<SqliteStore> {
        let sql = Arc::new(SqliteStore::in_memory().await.unwrap());
        EngineService::init(sql, Arc::new(hub.clone()), EngineConfig::default())
            .await
            .unwrap()
    }

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn posts_walkthrough() {
        let hub = RealtimeHub::spawn(&EngineConfig::default());
        let engine = create_service(&hub).await;

        engine
            .create_collection(CreateCollectionRequest::new(
                "posts",
                r#"{"properties":{"title":{"type":"string"},"published":{"type":"boolean","default":false}}}"#,
            ))
            .await
            .unwrap();

        let record = engine
            .create_record("posts", fields(json!({"title": "hi"})))
            .await
            .unwrap();
        let id = record["id"].as_str().unwrap().to_string();

        let page = engine
            .list_records("posts", &ListQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.items[0]["published"].is_null());

        engine.delete_record("posts", &id).await.unwrap();
        let page = engine
            .list_records("posts", &ListQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn writes_reach_subscribers() {
        let hub = RealtimeHub::spawn(&EngineConfig::default());
        let engine = create_service(&hub).await;
        engine
            .create_collection(CreateCollectionRequest::new(
                "posts",
                r#"{"properties":{"title":{"type":"string"}}}"#,
            ))
            .await
            .unwrap();

        let (session, mut rx) = hub.connect().await.unwrap();
        session
            .message(r#"{"type":"subscribe","collection":"posts"}"#.into())
            .await;

        let record = engine
            .create_record("posts", fields(json!({"title": "hi"})))
            .await
            .unwrap();

        let mut frames = Vec::new();
        while frames.len() < 3 {
            match rx.recv().await {
                Some(Outbound::Text(text)) => {
                    frames.push(serde_json::from_str::<serde_json::Value>(&text).unwrap());
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(frames[2]["type"], "event");
        assert_eq!(frames[2]["action"], "create");
        assert_eq!(frames[2]["record"]["title"], "hi");
        assert_eq!(frames[2]["id"], record["id"].as_str().unwrap());
    }

    #[tokio::test]
    async fn deleted_collection_is_not_found() {
        let hub = RealtimeHub::spawn(&EngineConfig::default());
        let engine = create_service(&hub).await;
        let collection = engine
            .create_collection(CreateCollectionRequest::new("posts", "{}"))
            .await
            .unwrap();

        assert_eq!(engine.list_collections().await.unwrap().len(), 1);
        engine.delete_collection(&collection.id).await.unwrap();

        assert!(engine.list_collections().await.unwrap().is_empty());
        assert!(matches!(
            engine.get_collection(&collection.id).await,
            Err(EngineError::CollectionNotFound(_))
        ));
        assert!(matches!(
            engine.list_records("posts", &ListQuery::default()).await,
            Err(EngineError::CollectionNotFound(_))
        ));
    }
}
