//! Collection management endpoints.
//!
//! Collections are registered schemas; each one owns a table of records.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use flarebase_auth::JwtValidator;
use flarebase_engine::{CollectionEngine, CreateCollectionRequest, UpdateCollectionRequest};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// List every collection, newest first.
///
/// # Errors
///
/// Returns an error if the registry cannot be read.
pub async fn list_collections<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    _user: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let collections = state.engine.list_collections().await?;
    Ok(Json(collections))
}

/// Register a collection and create its table.
///
/// # Errors
///
/// Returns an error if:
/// - The name is not a valid identifier or is reserved
/// - A collection with the same name exists
/// - The schema is not a JSON object
pub async fn create_collection<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    user: AuthUser,
    Json(body): Json<CreateCollectionRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let collection = state.engine.create_collection(body).await?;

    tracing::info!(
        collection = %collection.name,
        user_id = %user.user_id,
        "Collection created"
    );

    Ok((StatusCode::CREATED, Json(collection)))
}

/// Get a collection by ID.
///
/// # Errors
///
/// Returns an error if the collection is not found.
pub async fn get_collection<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let collection = state.engine.get_collection(&id).await?;
    Ok(Json(collection))
}

/// Rename a collection or replace its schema text.
///
/// # Errors
///
/// Returns an error if the collection is not found or the new name is
/// invalid or taken.
pub async fn update_collection<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    _user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateCollectionRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    let collection = state.engine.update_collection(&id, body).await?;
    Ok(Json(collection))
}

/// Drop a collection and all of its records.
///
/// # Errors
///
/// Returns an error if the collection is not found.
pub async fn delete_collection<E, V>(
    State(state): State<Arc<GatewayState<E, V>>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    E: CollectionEngine + 'static,
    V: JwtValidator + 'static,
{
    state.engine.delete_collection(&id).await?;

    tracing::info!(collection_id = %id, user_id = %user.user_id, "Collection deleted");

    Ok(StatusCode::NO_CONTENT)
}
