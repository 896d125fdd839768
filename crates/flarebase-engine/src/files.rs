//! File storage: blobs in a [`BlobStore`], metadata in the `files` table.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use flarebase_core::{generate_object_id, now_timestamp, FieldValue, Record};
use flarebase_store::{BlobStore, SqlStore, StoreError};
use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::types::{EngineConfig, ListResponse};

const CREATE_FILES_SQL: &str = "CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    size INTEGER NOT NULL,
    path TEXT NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 0,
    user_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

/// Owner recorded when an upload names none.
const SYSTEM_USER: &str = "system";

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// File ID.
    pub id: String,
    /// Original file name.
    pub name: String,
    /// MIME type.
    #[serde(rename = "type")]
    pub content_type: String,
    /// Size in bytes.
    pub size: i64,
    /// Blob path, `<folder>/<id>-<name>`.
    pub path: String,
    /// Served without authentication.
    pub is_public: bool,
    /// Uploader.
    pub user_id: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last modification timestamp.
    pub updated_at: String,
    /// Where the file can be fetched.
    pub url: String,
}

impl FileRecord {
    fn from_row(row: &Record) -> Result<Self> {
        let text = |column: &str| -> Result<String> {
            row.get(column)
                .and_then(FieldValue::as_str)
                .map(str::to_string)
                .ok_or_else(|| EngineError::Internal(format!("files row missing column {column}")))
        };
        let id = text("id")?;
        let is_public = row
            .get("is_public")
            .and_then(FieldValue::as_i64)
            .is_some_and(|v| v != 0);
        let url = if is_public {
            format!("/api/storage/{id}/public")
        } else {
            format!("/api/storage/{id}")
        };

        Ok(Self {
            name: text("name")?,
            content_type: text("type")?,
            size: row.get("size").and_then(FieldValue::as_i64).unwrap_or(0),
            path: text("path")?,
            is_public,
            user_id: row
                .get("user_id")
                .and_then(FieldValue::as_str)
                .map(str::to_string),
            created_at: text("created_at")?,
            updated_at: text("updated_at")?,
            url,
            id,
        })
    }
}

/// A file to store.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// File name.
    pub file_name: String,
    /// MIME type.
    pub content_type: String,
    /// Contents.
    pub data: Bytes,
    /// Serve without authentication.
    pub is_public: bool,
    /// Folder to place the blob in.
    pub folder: Option<String>,
    /// Uploader.
    pub user_id: Option<String>,
}

/// A file with its contents.
#[derive(Debug, Clone)]
pub struct FileDownload {
    /// Metadata.
    pub file: FileRecord,
    /// Contents.
    pub data: Bytes,
}

/// File storage operations.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store a file and its metadata.
    async fn upload(&self, request: UploadRequest) -> Result<FileRecord>;

    /// List files newest first, optionally only paths starting with `prefix`.
    async fn list(
        &self,
        page: Option<u32>,
        per_page: Option<u32>,
        prefix: Option<&str>,
    ) -> Result<ListResponse<FileRecord>>;

    /// Get file metadata.
    async fn get(&self, id: &str) -> Result<FileRecord>;

    /// Get a file with its contents.
    async fn download(&self, id: &str) -> Result<FileDownload>;

    /// Get a public file with its contents; private files are not found.
    async fn download_public(&self, id: &str) -> Result<FileDownload>;

    /// Delete a file's blob and metadata.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// [`FileStorage`] over a SQL store and a blob store.
pub struct FileService<S: SqlStore, B: BlobStore> {
    sql: Arc<S>,
    blobs: Arc<B>,
    config: EngineConfig,
}

fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(EngineError::Validation(format!("invalid file name '{name}'")));
    }
    Ok(())
}

impl<S: SqlStore, B: BlobStore> FileService<S, B> {
    /// Create a file service. Call [`migrate`](Self::migrate) before use.
    #[must_use]
    pub fn new(sql: Arc<S>, blobs: Arc<B>, config: EngineConfig) -> Self {
        Self { sql, blobs, config }
    }

    /// Create the `files` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn migrate(&self) -> Result<()> {
        self.sql.execute(CREATE_FILES_SQL, &[]).await?;
        Ok(())
    }

    async fn with_contents(&self, file: FileRecord) -> Result<FileDownload> {
        let data = self
            .blobs
            .get(&file.path)
            .await?
            .ok_or_else(|| EngineError::FileNotFound(file.id.clone()))?;
        Ok(FileDownload { file, data })
    }
}

#[async_trait]
impl<S: SqlStore, B: BlobStore> FileStorage for FileService<S, B> {
    async fn upload(&self, request: UploadRequest) -> Result<FileRecord> {
        validate_file_name(&request.file_name)?;

        let id = generate_object_id();
        let folder = request
            .folder
            .as_deref()
            .map(|f| f.trim_end_matches('/'))
            .filter(|f| !f.is_empty());
        let path = match folder {
            Some(folder) => format!("{folder}/{id}-{}", request.file_name),
            None => format!("{id}-{}", request.file_name),
        };
        let size = i64::try_from(request.data.len())
            .map_err(|_| EngineError::Validation("file too large".into()))?;

        self.blobs
            .put(&path, request.data)
            .await
            .map_err(|e| match e {
                StoreError::InvalidKey(reason) => EngineError::Validation(reason),
                other => other.into(),
            })?;

        let now = now_timestamp();
        let inserted = self
            .sql
            .execute(
                "INSERT INTO files (id, name, type, size, path, is_public, user_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                &[
                    id.as_str().into(),
                    request.file_name.as_str().into(),
                    request.content_type.as_str().into(),
                    size.into(),
                    path.as_str().into(),
                    i64::from(request.is_public).into(),
                    request.user_id.unwrap_or_else(|| SYSTEM_USER.to_string()).into(),
                    now.as_str().into(),
                    now.into(),
                ],
            )
            .await;

        if let Err(e) = inserted {
            tracing::warn!(file = %id, error = %e, "Metadata insert failed, removing blob");
            if let Err(cleanup) = self.blobs.delete(&path).await {
                tracing::error!(file = %id, path = %path, error = %cleanup, "Failed to remove orphaned blob");
            }
            return Err(e.into());
        }

        tracing::info!(file = %id, path = %path, size, "Stored file");
        self.get(&id).await
    }

    async fn list(
        &self,
        page: Option<u32>,
        per_page: Option<u32>,
        prefix: Option<&str>,
    ) -> Result<ListResponse<FileRecord>> {
        let (page, per_page) = self.config.paging(page, per_page);
        let (where_sql, mut params) = match prefix.filter(|p| !p.is_empty()) {
            Some(prefix) => (
                " WHERE substr(path, 1, ?) = ?",
                vec![
                    FieldValue::Integer(i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX)),
                    prefix.into(),
                ],
            ),
            None => ("", Vec::new()),
        };

        let total = self
            .sql
            .query_one(&format!("SELECT COUNT(*) AS count FROM files{where_sql}"), &params)
            .await?
            .and_then(|row| row.get("count").and_then(FieldValue::as_i64))
            .and_then(|count| u64::try_from(count).ok())
            .unwrap_or(0);

        params.push(FieldValue::Integer(i64::from(per_page)));
        params.push(FieldValue::Integer(
            i64::from(page - 1) * i64::from(per_page),
        ));
        let items = self
            .sql
            .query(
                &format!(
                    "SELECT * FROM files{where_sql} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
                ),
                &params,
            )
            .await?
            .iter()
            .map(FileRecord::from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(ListResponse::new(items, total, page, per_page))
    }

    async fn get(&self, id: &str) -> Result<FileRecord> {
        let row = self
            .sql
            .query_one("SELECT * FROM files WHERE id = ?", &[id.into()])
            .await?
            .ok_or_else(|| EngineError::FileNotFound(id.to_string()))?;
        FileRecord::from_row(&row)
    }

    async fn download(&self, id: &str) -> Result<FileDownload> {
        let file = self.get(id).await?;
        self.with_contents(file).await
    }

    async fn download_public(&self, id: &str) -> Result<FileDownload> {
        let file = self.get(id).await?;
        if !file.is_public {
            return Err(EngineError::FileNotFound(id.to_string()));
        }
        self.with_contents(file).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let file = self.get(id).await?;
        self.blobs.delete(&file.path).await?;
        self.sql
            .execute("DELETE FROM files WHERE id = ?", &[id.into()])
            .await?;
        tracing::info!(file = %id, "Deleted file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FailingSql;
    use flarebase_store::{FsBlobStore, SqliteStore};
    use tempfile::TempDir;

    struct Fixture {
        service: FileService<SqliteStore, FsBlobStore>,
        blobs: Arc<FsBlobStore>,
        _dir: TempDir,
    }

    async fn setup() -> Fixture {
        let dir = TempDir::new().unwrap();
        let sql = Arc::new(SqliteStore::in_memory().await.unwrap());
        let blobs = Arc::new(FsBlobStore::new(dir.path()).await.unwrap());
        let service = FileService::new(sql, Arc::clone(&blobs), EngineConfig::default());
        service.migrate().await.unwrap();
        Fixture {
            service,
            blobs,
            _dir: dir,
        }
    }

    fn upload(name: &str, folder: Option<&str>, is_public: bool) -> UploadRequest {
        UploadRequest {
            file_name: name.into(),
            content_type: "text/plain".into(),
            data: Bytes::from_static(b"hello"),
            is_public,
            folder: folder.map(str::to_string),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn upload_then_download() {
        let fx = setup().await;
        let file = fx
            .service
            .upload(upload("notes.txt", Some("docs/"), false))
            .await
            .unwrap();

        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.size, 5);
        assert_eq!(file.path, format!("docs/{}-notes.txt", file.id));
        assert_eq!(file.user_id.as_deref(), Some("system"));
        assert_eq!(file.url, format!("/api/storage/{}", file.id));

        let download = fx.service.download(&file.id).await.unwrap();
        assert_eq!(download.data, Bytes::from_static(b"hello"));
        assert_eq!(download.file, file);
    }

    #[tokio::test]
    async fn public_files_only() {
        let fx = setup().await;
        let private = fx.service.upload(upload("a.txt", None, false)).await.unwrap();
        let public = fx.service.upload(upload("b.txt", None, true)).await.unwrap();

        assert_eq!(public.url, format!("/api/storage/{}/public", public.id));
        assert!(fx.service.download_public(&public.id).await.is_ok());
        assert!(matches!(
            fx.service.download_public(&private.id).await,
            Err(EngineError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_by_prefix() {
        let fx = setup().await;
        fx.service.upload(upload("a.txt", Some("img"), false)).await.unwrap();
        fx.service.upload(upload("b.txt", Some("img"), false)).await.unwrap();
        fx.service.upload(upload("c.txt", Some("doc"), false)).await.unwrap();
        fx.service.upload(upload("d.txt", Some("img_%"), false)).await.unwrap();

        let all = fx.service.list(None, None, None).await.unwrap();
        assert_eq!(all.total, 4);

        let images = fx.service.list(None, None, Some("img/")).await.unwrap();
        assert_eq!(images.total, 2);
        assert!(images.items.iter().all(|f| f.path.starts_with("img/")));

        let page = fx.service.list(Some(2), Some(3), None).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total_pages, 2);
    }

    #[tokio::test]
    async fn delete_removes_blob_and_row() {
        let fx = setup().await;
        let file = fx.service.upload(upload("a.txt", None, false)).await.unwrap();

        fx.service.delete(&file.id).await.unwrap();
        assert!(fx.blobs.get(&file.path).await.unwrap().is_none());
        assert!(matches!(
            fx.service.get(&file.id).await,
            Err(EngineError::FileNotFound(_))
        ));
        assert!(matches!(
            fx.service.delete(&file.id).await,
            Err(EngineError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let fx = setup().await;
        let file = fx.service.upload(upload("a.txt", None, false)).await.unwrap();
        fx.blobs.delete(&file.path).await.unwrap();
        assert!(matches!(
            fx.service.download(&file.id).await,
            Err(EngineError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_metadata_insert_removes_blob() {
        let dir = TempDir::new().unwrap();
        let sql = Arc::new(FailingSql::new().await);
        let blobs = Arc::new(FsBlobStore::new(dir.path()).await.unwrap());
        let service = FileService::new(Arc::clone(&sql), blobs, EngineConfig::default());
        service.migrate().await.unwrap();

        sql.fail_on("INSERT INTO files");
        let result = service.upload(upload("a.txt", Some("docs"), false)).await;
        assert!(matches!(result, Err(EngineError::Store(_))));

        let docs = dir.path().join("docs");
        let leftover = std::fs::read_dir(&docs).map_or(0, |entries| entries.count());
        assert_eq!(leftover, 0);
        assert_eq!(service.list(None, None, None).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn rejects_unsafe_names() {
        let fx = setup().await;
        assert!(matches!(
            fx.service.upload(upload("../x", None, false)).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            fx.service.upload(upload("x", Some("../.."), false)).await,
            Err(EngineError::Validation(_))
        ));
        assert_eq!(fx.service.list(None, None, None).await.unwrap().total, 0);
    }
}
