//! File storage endpoints.
//!
//! Uploads are multipart forms with the contents in the `file` field and
//! optional `fileName`, `contentType`, `isPublic` and `folder` fields.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;

use flarebase_auth::JwtValidator;
use flarebase_engine::{CollectionEngine, FileDownload, UploadRequest};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const PUBLIC_CACHE_CONTROL: &str = "public, max-age=31536000";

// =============================================================================
// Request Types
// =============================================================================

/// Query parameters for listing files.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesQuery {
    /// 1-based page number.
    #[serde(default)]
    pub page: Option<u32>,
    /// Page size.
    #[serde(default)]
    pub per_page: Option<u32>,
    /// Only files whose path starts with this.
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Query parameters for fetching a file.
#[derive(Debug, Default, Deserialize)]
pub struct GetFileQuery {
    /// `1` or `true` returns the contents instead of the metadata.
    #[serde(default)]
    pub download: Option<String>,
}

impl GetFileQuery {
    fn wants_contents(&self) -> bool {
        matches!(self.download.as_deref(), Some("1" | "true"))
    }
}

#[derive(Debug, Default)]
struct UploadForm {
    data: Option<Bytes>,
    part_file_name: Option<String>,
    part_content_type: Option<String>,
    file_name: Option<String>,
    content_type: Option<String>,
    is_public: bool,
    folder: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    form.part_file_name = field.file_name().map(str::to_string);
                    form.part_content_type = field.content_type().map(str::to_string);
                    form.data = Some(field.bytes().await?);
                }
                "fileName" => form.file_name = non_empty(field.text().await?),
                "contentType" => form.content_type = non_empty(field.text().await?),
                "isPublic" => form.is_public = field.text().await?.trim() == "true",
                "folder" => form.folder = non_empty(field.text().await?),
                _ => {}
            }
        }

        Ok(form)
    }

    fn into_request(self, user_id: String) -> Result<UploadRequest, ApiError> {
        let data = self
            .data
            .ok_or_else(|| ApiError::BadRequest("no file uploaded".to_string()))?;
        let file_name = self
            .file_name
            .or(self.part_file_name)
            .ok_or_else(|| ApiError::BadRequest("fileName is required".to_string()))?;
        let content_type = self
            .content_type
            .or(self.part_content_type)
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        Ok(UploadRequest {
            file_name,
            content_type,
            data,
            is_public: self.is_public,
            folder: self.folder,
            user_id: Some(user_id),
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Build a response carrying a file's contents.
fn file_response(download: FileDownload, disposition: &str, public: bool) -> Response {
    let FileDownload { file, data } = download;
    let length = data.len();
    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(&file.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));

    let quoted = file.name.replace('"', "_");
    if let Ok(value) = HeaderValue::from_str(&format!("{disposition}; filename=\"{quoted}\"")) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    if public {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(PUBLIC_CACHE_CONTROL));
    }

    response
}

// =============================================================================
// Handlers
// =============================================================================

/// List stored files, newest first.
///
/// # Errors
///
/// Returns an error if the file table cannot be read.
pub async fn list_files<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    _user: AuthUser,
    Query(query): Query<ListFilesQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let page = state
        .files
        .list(query.page, query.per_page, query.prefix.as_deref())
        .await?;
    Ok(Json(page))
}

/// Store an uploaded file.
///
/// # Errors
///
/// Returns an error if:
/// - The form has no `file` field or no usable file name
/// - The file name contains a path separator
/// - The blob or its metadata cannot be written
pub async fn upload_file<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let request = UploadForm::read(multipart)
        .await?
        .into_request(user.user_id)?;
    let file = state.files.upload(request).await?;

    tracing::info!(file_id = %file.id, size = file.size, "File uploaded");

    Ok((StatusCode::CREATED, Json(file)))
}

/// Get a file's metadata, or its contents with `?download=1`.
///
/// # Errors
///
/// Returns `NotFound` if the file or its blob is missing.
pub async fn get_file<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    _user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<GetFileQuery>,
) -> Result<Response, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    if query.wants_contents() {
        let download = state.files.download(&id).await?;
        return Ok(file_response(download, "attachment", false));
    }

    let file = state.files.get(&id).await?;
    Ok(Json(file).into_response())
}

/// Serve a public file without authentication.
///
/// # Errors
///
/// Returns `NotFound` if the file is missing or not public.
pub async fn get_public_file<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let download = state.files.download_public(&id).await?;
    Ok(file_response(download, "inline", true))
}

/// Delete a file.
///
/// # Errors
///
/// Returns `NotFound` if the file is missing.
pub async fn delete_file<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    state.files.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
