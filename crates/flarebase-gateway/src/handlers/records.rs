//! Record endpoints.
//!
//! Records are addressed by collection name. Every successful write is
//! published to realtime subscribers of the collection by the engine.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use flarebase_auth::JwtValidator;
use flarebase_engine::{CollectionEngine, Fields, ListQuery};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// List one page of records.
///
/// Query parameters: `page`, `perPage`, `sort` (`-field` for descending) and
/// `filter` (`field=value,field2=value2`).
///
/// # Errors
///
/// Returns an error if the collection is not found or the sort or filter
/// names an unknown field.
pub async fn list_records<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    _user: AuthUser,
    Path(collection): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let page = state.engine.list_records(&collection, &query).await?;
    Ok(Json(page))
}

/// Insert a record.
///
/// # Errors
///
/// Returns an error if the collection is not found or the body names a
/// field the schema does not declare.
pub async fn create_record<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    _user: AuthUser,
    Path(collection): Path<String>,
    Json(fields): Json<Fields>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let record = state.engine.create_record(&collection, fields).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Get a record by ID.
///
/// # Errors
///
/// Returns an error if the collection or the record is not found.
pub async fn get_record<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    _user: AuthUser,
    Path((collection, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let record = state.engine.get_record(&collection, &id).await?;
    Ok(Json(record))
}

/// Update the given fields of a record.
///
/// # Errors
///
/// Returns an error if the collection or the record is not found, or the
/// body names an undeclared field.
pub async fn update_record<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    _user: AuthUser,
    Path((collection, id)): Path<(String, String)>,
    Json(fields): Json<Fields>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let record = state.engine.update_record(&collection, &id, fields).await?;
    Ok(Json(record))
}

/// Delete a record.
///
/// # Errors
///
/// Returns an error if the collection or the record is not found.
pub async fn delete_record<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    _user: AuthUser,
    Path((collection, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    state.engine.delete_record(&collection, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
