//! Record Store.
//!
//! Generic CRUD over a collection's table. Every committed write is followed
//! by one [`RealtimeEvent`]; the event is sent after the statement returns
//! and a failed delivery never undoes the write.

use std::sync::Arc;

use flarebase_core::{generate_object_id, now_timestamp, FieldValue, Record};
use flarebase_store::SqlStore;

use crate::error::{EngineError, Result};
use crate::events::{EventPublisher, RealtimeEvent, RecordAction};
use crate::query::RecordQuery;
use crate::schema::{ResolvedCollection, SchemaRegistry, SYSTEM_COLUMNS};
use crate::types::{EngineConfig, ListQuery, ListResponse};

/// Record CRUD for every registered collection.
pub struct RecordStore<S: SqlStore> {
    sql: Arc<S>,
    registry: SchemaRegistry<S>,
    publisher: Arc<dyn EventPublisher>,
    config: EngineConfig,
}

impl<S: SqlStore> Clone for RecordStore<S> {
    fn clone(&self) -> Self {
        Self {
            sql: Arc::clone(&self.sql),
            registry: self.registry.clone(),
            publisher: Arc::clone(&self.publisher),
            config: self.config.clone(),
        }
    }
}

/// Keep the caller's writable fields, rejecting names the table cannot have.
fn writable_fields(
    resolved: &ResolvedCollection,
    fields: serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<(String, FieldValue)>> {
    let mut writable = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        if SYSTEM_COLUMNS.contains(&name.as_str()) {
            continue;
        }
        if resolved.schema.column_type(&name).is_none() {
            return Err(EngineError::Validation(format!(
                "unknown field '{name}' for collection {}",
                resolved.table
            )));
        }
        writable.push((name, FieldValue::from_json(value)));
    }
    Ok(writable)
}

impl<S: SqlStore> RecordStore<S> {
    /// Create a record store.
    #[must_use]
    pub fn new(
        sql: Arc<S>,
        registry: SchemaRegistry<S>,
        publisher: Arc<dyn EventPublisher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sql,
            registry,
            publisher,
            config,
        }
    }

    /// List one page of a collection.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` for an unknown collection and
    /// `Validation` for an unknown sort or filter field.
    pub async fn list(&self, collection: &str, query: &ListQuery) -> Result<ListResponse<Record>> {
        let resolved = self.registry.resolve(collection).await?;
        let query = RecordQuery::parse(query, &resolved.schema, &self.config)?;
        let table = &resolved.table;
        let (where_sql, mut params) = query.where_clause();

        let total = self
            .sql
            .query_one(
                &format!("SELECT COUNT(*) AS count FROM \"{table}\"{where_sql}"),
                &params,
            )
            .await?
            .and_then(|row| row.get("count").and_then(FieldValue::as_i64))
            .and_then(|count| u64::try_from(count).ok())
            .unwrap_or(0);

        params.push(FieldValue::Integer(i64::from(query.per_page)));
        params.push(FieldValue::Integer(
            i64::try_from(query.offset()).unwrap_or(i64::MAX),
        ));
        let rows = self
            .sql
            .query(
                &format!(
                    "SELECT * FROM \"{table}\"{where_sql}{} LIMIT ? OFFSET ?",
                    query.order_clause()
                ),
                &params,
            )
            .await?;

        let items = rows
            .into_iter()
            .map(|row| resolved.schema.decode_row(row))
            .collect();
        Ok(ListResponse::new(items, total, query.page, query.per_page))
    }

    /// Get one record.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` or `RecordNotFound`.
    pub async fn get(&self, collection: &str, id: &str) -> Result<Record> {
        let resolved = self.registry.resolve(collection).await?;
        self.fetch(&resolved, id).await
    }

    async fn fetch(&self, resolved: &ResolvedCollection, id: &str) -> Result<Record> {
        let row = self
            .sql
            .query_one(
                &format!("SELECT * FROM \"{}\" WHERE \"id\" = ?", resolved.table),
                &[id.into()],
            )
            .await?
            .ok_or_else(|| EngineError::RecordNotFound {
                collection: resolved.collection.name.clone(),
                id: id.to_string(),
            })?;
        Ok(resolved.schema.decode_row(row))
    }

    /// Insert a record. The server assigns `id`, `created_at` and `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` for an unknown collection and
    /// `Validation` for a field the collection does not declare.
    pub async fn create(
        &self,
        collection: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Record> {
        let resolved = self.registry.resolve(collection).await?;
        let fields = writable_fields(&resolved, fields)?;

        let id = generate_object_id();
        let now = now_timestamp();
        let mut columns = vec!["\"id\"".to_string(), "\"created_at\"".into(), "\"updated_at\"".into()];
        let mut params: Vec<FieldValue> = vec![id.as_str().into(), now.as_str().into(), now.into()];
        for (name, value) in fields {
            columns.push(format!("\"{name}\""));
            params.push(value);
        }
        let placeholders = vec!["?"; columns.len()].join(", ");

        self.sql
            .execute(
                &format!(
                    "INSERT INTO \"{}\" ({}) VALUES ({placeholders})",
                    resolved.table,
                    columns.join(", ")
                ),
                &params,
            )
            .await?;

        let record = self.fetch(&resolved, &id).await?;
        tracing::debug!(collection = %resolved.table, id = %id, "Created record");
        self.publisher
            .publish(RealtimeEvent::changed(
                RecordAction::Create,
                resolved.collection.name,
                record.clone(),
            ))
            .await;
        Ok(record)
    }

    /// Overwrite the given fields of a record and re-stamp `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound`, `RecordNotFound`, or `Validation` for a
    /// field the collection does not declare.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Record> {
        let resolved = self.registry.resolve(collection).await?;
        let fields = writable_fields(&resolved, fields)?;
        self.fetch(&resolved, id).await?;

        let mut assignments = Vec::with_capacity(fields.len() + 1);
        let mut params = Vec::with_capacity(fields.len() + 2);
        for (name, value) in fields {
            assignments.push(format!("\"{name}\" = ?"));
            params.push(value);
        }
        assignments.push("\"updated_at\" = ?".to_string());
        params.push(now_timestamp().into());
        params.push(id.into());

        let changed = self
            .sql
            .execute(
                &format!(
                    "UPDATE \"{}\" SET {} WHERE \"id\" = ?",
                    resolved.table,
                    assignments.join(", ")
                ),
                &params,
            )
            .await?;
        if changed == 0 {
            return Err(EngineError::RecordNotFound {
                collection: resolved.collection.name,
                id: id.to_string(),
            });
        }

        let record = self.fetch(&resolved, id).await?;
        tracing::debug!(collection = %resolved.table, id, "Updated record");
        self.publisher
            .publish(RealtimeEvent::changed(
                RecordAction::Update,
                resolved.collection.name,
                record.clone(),
            ))
            .await;
        Ok(record)
    }

    /// Delete a record.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` or `RecordNotFound`.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let resolved = self.registry.resolve(collection).await?;
        let deleted = self
            .sql
            .execute(
                &format!("DELETE FROM \"{}\" WHERE \"id\" = ?", resolved.table),
                &[id.into()],
            )
            .await?;
        if deleted == 0 {
            return Err(EngineError::RecordNotFound {
                collection: resolved.collection.name,
                id: id.to_string(),
            });
        }

        tracing::debug!(collection = %resolved.table, id, "Deleted record");
        self.publisher
            .publish(RealtimeEvent::deleted(resolved.collection.name, id))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingPublisher;
    use crate::types::CreateCollectionRequest;
    use flarebase_store::SqliteStore;
    use serde_json::json;

    const POSTS_SCHEMA: &str = r#"{"properties":{"title":{"type":"string"},"views":{"type":"integer"},"published":{"type":"boolean","default":false},"tags":{"type":"array"}}}"#;

    struct Fixture {
        store: RecordStore<SqliteStore>,
        registry: SchemaRegistry<SqliteStore>,
        publisher: Arc<RecordingPublisher>,
    }

    async fn setup() -> Fixture {
        let sql = Arc::new(SqliteStore::in_memory().await.unwrap());
        let registry = SchemaRegistry::new(Arc::clone(&sql));
        registry.migrate().await.unwrap();
        registry
            .create(CreateCollectionRequest::new("posts", POSTS_SCHEMA))
            .await
            .unwrap();
        let publisher = Arc::new(RecordingPublisher::default());
        let store = RecordStore::new(
            sql,
            registry.clone(),
            publisher.clone(),
            EngineConfig::default(),
        );
        Fixture {
            store,
            registry,
            publisher,
        }
    }

    fn fields(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn text<'a>(record: &'a Record, field: &str) -> &'a str {
        record[field].as_str().unwrap()
    }

    #[tokio::test]
    async fn create_assigns_system_fields() {
        let fx = setup().await;
        let record = fx
            .store
            .create(
                "posts",
                fields(json!({"title": "hi", "id": "mine", "created_at": "1999"})),
            )
            .await
            .unwrap();

        assert_eq!(text(&record, "title"), "hi");
        assert_ne!(text(&record, "id"), "mine");
        assert_ne!(text(&record, "created_at"), "1999");
        assert_eq!(text(&record, "created_at"), text(&record, "updated_at"));
        assert_eq!(record["published"], FieldValue::Null);

        let fetched = fx.store.get("posts", text(&record, "id")).await.unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn values_stored_and_decoded() {
        let fx = setup().await;
        let record = fx
            .store
            .create(
                "posts",
                fields(json!({"title": "x", "views": 7, "published": true, "tags": ["a", "b"]})),
            )
            .await
            .unwrap();
        assert_eq!(record["views"], FieldValue::Integer(7));
        assert_eq!(record["published"], FieldValue::Bool(true));
        assert_eq!(record["tags"], FieldValue::Text(r#"["a","b"]"#.into()));
    }

    #[tokio::test]
    async fn unknown_field_rejected() {
        let fx = setup().await;
        let result = fx
            .store
            .create("posts", fields(json!({"title": "x", "body": "y"})))
            .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert!(fx.publisher.events.lock().is_empty());
    }

    #[tokio::test]
    async fn missing_collection() {
        let fx = setup().await;
        assert!(matches!(
            fx.store.create("ghosts", fields(json!({}))).await,
            Err(EngineError::CollectionNotFound(_))
        ));
        assert!(matches!(
            fx.store.list("ghosts", &ListQuery::default()).await,
            Err(EngineError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_preserves_identity_and_advances_timestamp() {
        let fx = setup().await;
        let created = fx
            .store
            .create("posts", fields(json!({"title": "a", "views": 1})))
            .await
            .unwrap();
        let id = text(&created, "id").to_string();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;

        let updated = fx
            .store
            .update("posts", &id, fields(json!({"title": "b", "id": "other"})))
            .await
            .unwrap();
        assert_eq!(text(&updated, "id"), id);
        assert_eq!(text(&updated, "title"), "b");
        assert_eq!(updated["views"], FieldValue::Integer(1));
        assert_eq!(text(&updated, "created_at"), text(&created, "created_at"));
        assert!(text(&updated, "updated_at") > text(&created, "updated_at"));
    }

    #[tokio::test]
    async fn empty_update_restamps() {
        let fx = setup().await;
        let created = fx
            .store
            .create("posts", fields(json!({"title": "a"})))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let updated = fx
            .store
            .update("posts", text(&created, "id"), serde_json::Map::new())
            .await
            .unwrap();
        assert!(text(&updated, "updated_at") > text(&created, "updated_at"));
        assert_eq!(fx.publisher.events.lock().len(), 2);
    }

    #[tokio::test]
    async fn missing_record() {
        let fx = setup().await;
        assert!(matches!(
            fx.store.get("posts", "nope").await,
            Err(EngineError::RecordNotFound { .. })
        ));
        assert!(matches!(
            fx.store.update("posts", "nope", fields(json!({"title": "x"}))).await,
            Err(EngineError::RecordNotFound { .. })
        ));
        assert!(matches!(
            fx.store.delete("posts", "nope").await,
            Err(EngineError::RecordNotFound { .. })
        ));
        assert!(fx.publisher.events.lock().is_empty());
    }

    #[tokio::test]
    async fn delete_then_list_empty() {
        let fx = setup().await;
        let record = fx
            .store
            .create("posts", fields(json!({"title": "hi"})))
            .await
            .unwrap();
        let id = text(&record, "id").to_string();

        let page = fx.store.list("posts", &ListQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items.len(), 1);

        fx.store.delete("posts", &id).await.unwrap();
        assert!(matches!(
            fx.store.get("posts", &id).await,
            Err(EngineError::RecordNotFound { .. })
        ));
        let page = fx.store.list("posts", &ListQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn events_follow_writes() {
        let fx = setup().await;
        let record = fx
            .store
            .create("posts", fields(json!({"title": "hi"})))
            .await
            .unwrap();
        let id = text(&record, "id").to_string();
        fx.store
            .update("posts", &id, fields(json!({"title": "ho"})))
            .await
            .unwrap();
        fx.store.delete("posts", &id).await.unwrap();

        let events = fx.publisher.events.lock();
        let actions: Vec<_> = events.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            [RecordAction::Create, RecordAction::Update, RecordAction::Delete]
        );
        assert!(events.iter().all(|e| e.collection == "posts"));
        assert!(events.iter().all(|e| e.id.as_deref() == Some(id.as_str())));
        assert_eq!(
            events[1].record.as_ref().unwrap()["title"],
            FieldValue::from("ho")
        );
        assert!(events[2].record.is_none());
    }

    #[tokio::test]
    async fn pages_are_disjoint_and_total_stable() {
        let fx = setup().await;
        for i in 0..25 {
            fx.store
                .create("posts", fields(json!({"title": format!("post {i}"), "views": i})))
                .await
                .unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        for page in 1..=3 {
            let result = fx
                .store
                .list(
                    "posts",
                    &ListQuery {
                        page: Some(page),
                        per_page: Some(10),
                        ..ListQuery::default()
                    },
                )
                .await
                .unwrap();
            assert_eq!(result.total, 25);
            assert_eq!(result.total_pages, 3);
            for item in result.items {
                assert!(seen.insert(text(&item, "id").to_string()));
            }
        }
        assert_eq!(seen.len(), 25);
    }

    #[tokio::test]
    async fn filter_and_sort() {
        let fx = setup().await;
        for (title, views, published) in [("a", 3, true), ("b", 1, false), ("c", 2, true)] {
            fx.store
                .create(
                    "posts",
                    fields(json!({"title": title, "views": views, "published": published})),
                )
                .await
                .unwrap();
        }

        let result = fx
            .store
            .list(
                "posts",
                &ListQuery {
                    sort: Some("views".into()),
                    filter: Some("published=true".into()),
                    ..ListQuery::default()
                },
            )
            .await
            .unwrap();
        let titles: Vec<_> = result.items.iter().map(|r| text(r, "title")).collect();
        assert_eq!(titles, ["c", "a"]);
        assert_eq!(result.total, 2);

        let result = fx
            .store
            .list(
                "posts",
                &ListQuery {
                    filter: Some("published=true,views=3".into()),
                    ..ListQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(text(&result.items[0], "title"), "a");
    }

    #[tokio::test]
    async fn deleted_collection_is_gone_for_records() {
        let fx = setup().await;
        let collection = fx.registry.find_by_name("posts").await.unwrap().unwrap();
        fx.registry.delete(&collection.id).await.unwrap();
        assert!(matches!(
            fx.store.get("posts", "x").await,
            Err(EngineError::CollectionNotFound(_))
        ));
    }
}
