//! REST handlers over the record store and blob storage.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use shoplist_core::store::{BlobStore, Collection, Filter, Query, Record, RemoteStore};

use super::auth::AuthUser;
use super::error::ApiError;
use super::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    filter: Filter,
    patch: Record,
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    #[serde(default)]
    filter: Filter,
}

#[derive(Debug, Serialize)]
pub struct Affected {
    affected: u64,
}

#[derive(Debug, Serialize)]
pub struct Count {
    count: u64,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    names: Vec<String>,
}

pub async fn select(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(query): Json<Query>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let collection = Collection::parse(&collection)?;
    Ok(Json(state.store.select(collection, &query).await?))
}

pub async fn insert(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(collection): Path<String>,
    Json(records): Json<Vec<Record>>,
) -> Result<(StatusCode, Json<Vec<Record>>), ApiError> {
    let collection = Collection::parse(&collection)?;
    let stored = state.store.insert(collection, records).await?;
    tracing::info!("{} inserted {} row(s) into {}", user.user_id, stored.len(), collection);
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(collection): Path<String>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<Affected>, ApiError> {
    let collection = Collection::parse(&collection)?;
    let affected = state
        .store
        .update(collection, &request.filter, request.patch)
        .await?;
    tracing::info!("{} updated {} row(s) in {}", user.user_id, affected, collection);
    Ok(Json(Affected { affected }))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(collection): Path<String>,
    Json(request): Json<FilterRequest>,
) -> Result<Json<Affected>, ApiError> {
    let collection = Collection::parse(&collection)?;
    let affected = state.store.delete(collection, &request.filter).await?;
    tracing::info!("{} deleted {} row(s) from {}", user.user_id, affected, collection);
    Ok(Json(Affected { affected }))
}

pub async fn count(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(request): Json<FilterRequest>,
) -> Result<Json<Count>, ApiError> {
    let collection = Collection::parse(&collection)?;
    let count = state.store.count(collection, &request.filter).await?;
    Ok(Json(Count { count }))
}

pub async fn upload_blob(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    state
        .blobs
        .upload(&name, body.to_vec(), content_type)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "url": state.blobs.public_url(&name) })),
    ))
}

pub async fn download_blob(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state.blobs.read(&name).await?;
    let mime = mime_guess::from_path(&name).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response())
}

pub async fn remove_blobs(
    State(state): State<AppState>,
    Json(request): Json<RemoveRequest>,
) -> Result<StatusCode, ApiError> {
    state.blobs.remove(&request.names).await?;
    Ok(StatusCode::NO_CONTENT)
}
