//! Schema Registry.
//!
//! Collections are rows in the `collections` registry table, each reflected
//! into a physical table of the same name. This module parses schema
//! documents, generates their DDL, and keeps the registry and the physical
//! tables in step.

use std::sync::Arc;

use flarebase_core::{
    generate_object_id, is_identifier, now_timestamp, CollectionName, FieldValue, Record,
    MAX_COLLECTION_NAME_LEN,
};
use flarebase_store::SqlStore;

use crate::error::{EngineError, Result};
use crate::types::{Collection, CreateCollectionRequest, UpdateCollectionRequest};

/// Columns every collection table has, managed by the server.
pub const SYSTEM_COLUMNS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Tables owned by the engine itself; collections may not take these names.
const RESERVED_TABLES: [&str; 2] = ["collections", "files"];

const CREATE_REGISTRY_SQL: &str = "CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    schema TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

// =============================================================================
// Schema documents
// =============================================================================

/// Declared type of a schema property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `"string"`.
    String,
    /// `"number"`.
    Number,
    /// `"integer"`.
    Integer,
    /// `"boolean"`, stored as 0/1.
    Boolean,
    /// `"array"`, stored as JSON text.
    Array,
    /// `"object"`, stored as JSON text.
    Object,
    /// Missing or unrecognised type, stored as text.
    Other,
}

impl FieldType {
    fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("string") => Self::String,
            Some("number") => Self::Number,
            Some("integer") => Self::Integer,
            Some("boolean") => Self::Boolean,
            Some("array") => Self::Array,
            Some("object") => Self::Object,
            _ => Self::Other,
        }
    }

    /// The column type this field is stored as.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Number | Self::Boolean => "INTEGER",
            Self::String | Self::Array | Self::Object | Self::Other => "TEXT",
        }
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaProperty {
    /// Field (column) name.
    pub name: String,
    /// Declared type.
    pub field_type: FieldType,
}

/// A parsed collection schema: the ordered list of declared fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSchema {
    properties: Vec<SchemaProperty>,
}

/// Property names follow the collection name rule.
fn is_field_name(name: &str) -> bool {
    name.len() <= MAX_COLLECTION_NAME_LEN && is_identifier(name)
}

impl CollectionSchema {
    /// Parse a schema document.
    ///
    /// The document must be a JSON object. Its optional `properties` member
    /// must map field names to objects; a field's optional `type` selects
    /// its storage type.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidSchema` if the document is malformed or
    /// declares an unusable field name.
    pub fn parse(text: &str) -> Result<Self> {
        let document: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| EngineError::InvalidSchema(format!("schema is not valid JSON: {e}")))?;
        let document = document
            .as_object()
            .ok_or_else(|| EngineError::InvalidSchema("schema must be a JSON object".into()))?;

        let Some(properties) = document.get("properties") else {
            return Ok(Self::default());
        };
        let properties = properties
            .as_object()
            .ok_or_else(|| EngineError::InvalidSchema("properties must be an object".into()))?;

        let mut parsed = Vec::with_capacity(properties.len());
        for (name, definition) in properties {
            if !is_field_name(name) {
                return Err(EngineError::InvalidSchema(format!(
                    "invalid field name '{name}'"
                )));
            }
            if SYSTEM_COLUMNS.contains(&name.as_str()) {
                return Err(EngineError::InvalidSchema(format!(
                    "field '{name}' is managed by the server"
                )));
            }
            let definition = definition.as_object().ok_or_else(|| {
                EngineError::InvalidSchema(format!("field '{name}' must be an object"))
            })?;
            let field_type =
                FieldType::from_name(definition.get("type").and_then(serde_json::Value::as_str));
            parsed.push(SchemaProperty {
                name: name.clone(),
                field_type,
            });
        }

        Ok(Self { properties: parsed })
    }

    /// The declared fields, in document order.
    #[must_use]
    pub fn properties(&self) -> &[SchemaProperty] {
        &self.properties
    }

    /// Type of a column a caller may reference. System columns are text.
    #[must_use]
    pub fn column_type(&self, name: &str) -> Option<FieldType> {
        if SYSTEM_COLUMNS.contains(&name) {
            return Some(FieldType::String);
        }
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.field_type)
    }

    /// `CREATE TABLE` statement for a collection with this schema.
    #[must_use]
    pub fn create_table_sql(&self, table: &CollectionName) -> String {
        let mut columns = vec![
            "\"id\" TEXT PRIMARY KEY".to_string(),
            "\"created_at\" TEXT NOT NULL".to_string(),
            "\"updated_at\" TEXT NOT NULL".to_string(),
        ];
        columns.extend(
            self.properties
                .iter()
                .map(|p| format!("\"{}\" {}", p.name, p.field_type.sql_type())),
        );
        format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" ({})",
            columns.join(", ")
        )
    }

    /// Convert a stored row to its API shape: boolean fields become JSON booleans.
    #[must_use]
    pub fn decode_row(&self, mut row: Record) -> Record {
        for property in &self.properties {
            if property.field_type != FieldType::Boolean {
                continue;
            }
            if let Some(value) = row.get_mut(&property.name) {
                if let FieldValue::Integer(i) = *value {
                    *value = FieldValue::Bool(i != 0);
                }
            }
        }
        row
    }
}

/// A collection resolved for record access.
#[derive(Debug, Clone)]
pub struct ResolvedCollection {
    /// Registry entry.
    pub collection: Collection,
    /// Validated table name.
    pub table: CollectionName,
    /// Parsed schema.
    pub schema: CollectionSchema,
}

// =============================================================================
// Registry
// =============================================================================

/// The collection registry over a [`SqlStore`].
pub struct SchemaRegistry<S: SqlStore> {
    sql: Arc<S>,
}

impl<S: SqlStore> Clone for SchemaRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            sql: Arc::clone(&self.sql),
        }
    }
}

fn validate_name(name: &str) -> Result<CollectionName> {
    let name = CollectionName::parse(name)?;
    if RESERVED_TABLES.contains(&name.as_str()) || name.as_str().starts_with("sqlite_") {
        return Err(EngineError::Validation(format!(
            "collection name '{name}' is reserved"
        )));
    }
    Ok(name)
}

impl<S: SqlStore> SchemaRegistry<S> {
    /// Create a registry over `sql`. Call [`migrate`](Self::migrate) before use.
    #[must_use]
    pub fn new(sql: Arc<S>) -> Self {
        Self { sql }
    }

    /// Create the registry table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn migrate(&self) -> Result<()> {
        self.sql.execute(CREATE_REGISTRY_SQL, &[]).await?;
        Ok(())
    }

    /// Register a collection and create its table.
    ///
    /// # Errors
    ///
    /// - `Validation` if the name is malformed or reserved
    /// - `InvalidSchema` if the schema does not parse or the table cannot be created
    /// - `DuplicateName` if a collection with this name exists
    pub async fn create(&self, request: CreateCollectionRequest) -> Result<Collection> {
        let name = validate_name(&request.name)?;
        let schema = CollectionSchema::parse(&request.schema)?;

        if self.find_by_name(name.as_str()).await?.is_some() {
            return Err(EngineError::DuplicateName(name.to_string()));
        }

        let now = now_timestamp();
        let collection = Collection {
            id: generate_object_id(),
            name: name.to_string(),
            schema: request.schema,
            created_at: now.clone(),
            updated_at: now,
        };

        self.sql
            .execute(
                "INSERT INTO collections (id, name, schema, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
                &[
                    collection.id.as_str().into(),
                    collection.name.as_str().into(),
                    collection.schema.as_str().into(),
                    collection.created_at.as_str().into(),
                    collection.updated_at.as_str().into(),
                ],
            )
            .await
            .map_err(|e| {
                if e.is_unique_violation() {
                    EngineError::DuplicateName(collection.name.clone())
                } else {
                    e.into()
                }
            })?;

        if let Err(e) = self.sql.execute(&schema.create_table_sql(&name), &[]).await {
            tracing::warn!(collection = %name, error = %e, "Table creation failed, rolling back registry row");
            if let Err(rollback) = self
                .sql
                .execute(
                    "DELETE FROM collections WHERE id = ?",
                    &[collection.id.as_str().into()],
                )
                .await
            {
                tracing::error!(collection = %name, error = %rollback, "Failed to roll back registry row");
            }
            return Err(EngineError::InvalidSchema(e.to_string()));
        }

        tracing::info!(collection = %name, id = %collection.id, "Created collection");
        Ok(collection)
    }

    /// Get a collection by ID.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if no collection has this ID.
    pub async fn get(&self, id: &str) -> Result<Collection> {
        let row = self
            .sql
            .query_one("SELECT * FROM collections WHERE id = ?", &[id.into()])
            .await?
            .ok_or_else(|| EngineError::CollectionNotFound(id.to_string()))?;
        Collection::from_row(&row)
    }

    /// Find a collection by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Collection>> {
        self.sql
            .query_one("SELECT * FROM collections WHERE name = ?", &[name.into()])
            .await?
            .as_ref()
            .map(Collection::from_row)
            .transpose()
    }

    /// Resolve a collection by name for record access.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if the name is not registered (or could
    /// never be), `InvalidSchema` if the stored schema no longer parses.
    pub async fn resolve(&self, name: &str) -> Result<ResolvedCollection> {
        let table = CollectionName::parse(name)
            .map_err(|_| EngineError::CollectionNotFound(name.to_string()))?;
        let collection = self
            .find_by_name(name)
            .await?
            .ok_or_else(|| EngineError::CollectionNotFound(name.to_string()))?;
        let schema = CollectionSchema::parse(&collection.schema)?;
        Ok(ResolvedCollection {
            collection,
            table,
            schema,
        })
    }

    /// List all collections, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(&self) -> Result<Vec<Collection>> {
        self.sql
            .query("SELECT * FROM collections ORDER BY created_at DESC", &[])
            .await?
            .iter()
            .map(Collection::from_row)
            .collect()
    }

    /// Update a collection's name and/or schema text.
    ///
    /// A new schema is stored as given; the physical table keeps its
    /// columns. A new name renames the physical table.
    ///
    /// # Errors
    ///
    /// - `CollectionNotFound` if no collection has this ID
    /// - `Validation` / `InvalidSchema` for a malformed name or schema
    /// - `DuplicateName` if another collection already has the new name
    pub async fn update(&self, id: &str, request: UpdateCollectionRequest) -> Result<Collection> {
        let mut collection = self.get(id).await?;
        let old_name = CollectionName::parse(&collection.name)?;

        if let Some(schema) = request.schema {
            CollectionSchema::parse(&schema)?;
            collection.schema = schema;
        }

        let renamed = match request.name {
            Some(name) if name != collection.name => {
                let new_name = validate_name(&name)?;
                if self.find_by_name(new_name.as_str()).await?.is_some() {
                    return Err(EngineError::DuplicateName(new_name.to_string()));
                }
                self.sql
                    .execute(
                        &format!("ALTER TABLE \"{old_name}\" RENAME TO \"{new_name}\""),
                        &[],
                    )
                    .await?;
                collection.name = new_name.to_string();
                Some(new_name)
            }
            _ => None,
        };

        collection.updated_at = now_timestamp();

        let updated = self
            .sql
            .execute(
                "UPDATE collections SET name = ?, schema = ?, updated_at = ? WHERE id = ?",
                &[
                    collection.name.as_str().into(),
                    collection.schema.as_str().into(),
                    collection.updated_at.as_str().into(),
                    id.into(),
                ],
            )
            .await;

        if let Err(e) = updated {
            if let Some(new_name) = &renamed {
                tracing::error!(collection = %old_name, error = %e, "Registry update failed, restoring table name");
                if let Err(restore) = self
                    .sql
                    .execute(
                        &format!("ALTER TABLE \"{new_name}\" RENAME TO \"{old_name}\""),
                        &[],
                    )
                    .await
                {
                    tracing::error!(collection = %old_name, error = %restore, "Failed to restore table name");
                }
            }
            return Err(if e.is_unique_violation() {
                EngineError::DuplicateName(collection.name)
            } else {
                e.into()
            });
        }

        tracing::info!(collection = %collection.name, id, "Updated collection");
        Ok(collection)
    }

    /// Drop a collection's table and remove it from the registry.
    ///
    /// If the registry row cannot be removed after the table was dropped,
    /// an empty table is recreated so the registry and the physical tables
    /// still agree, and the storage error is returned.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if no collection has this ID, or the
    /// storage error of the failing step.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let collection = self.get(id).await?;
        let table = CollectionName::parse(&collection.name)?;

        self.sql
            .execute(&format!("DROP TABLE IF EXISTS \"{table}\""), &[])
            .await?;

        if let Err(e) = self
            .sql
            .execute("DELETE FROM collections WHERE id = ?", &[id.into()])
            .await
        {
            tracing::error!(collection = %table, error = %e, "Registry delete failed after drop, recreating table");
            match CollectionSchema::parse(&collection.schema) {
                Ok(schema) => {
                    if let Err(recreate) = self.sql.execute(&schema.create_table_sql(&table), &[]).await {
                        tracing::error!(collection = %table, error = %recreate, "Failed to recreate table");
                    }
                }
                Err(parse) => {
                    tracing::error!(collection = %table, error = %parse, "Stored schema no longer parses");
                }
            }
            return Err(e.into());
        }

        tracing::info!(collection = %table, id, "Deleted collection");
        Ok(())
    }
}
