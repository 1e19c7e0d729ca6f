//! HTTP surface of the Shoplist server.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check (no auth required)
//! - `POST /rest/{collection}/select`: Query records
//! - `POST /rest/{collection}`: Insert records
//! - `PATCH /rest/{collection}`: Update records matching a filter
//! - `POST /rest/{collection}/delete`: Delete records matching a filter
//! - `POST /rest/{collection}/count`: Count records matching a filter
//! - `GET /realtime/{collection}`: WebSocket change feed
//! - `PUT /storage/{name}`, `GET /storage/{name}`: Upload / fetch an image
//! - `POST /storage/remove`: Remove images

pub mod auth;
pub mod blobs;
pub mod error;
pub mod realtime;
pub mod routes;

pub use auth::{ApiKeyStore, AuthUser};
pub use blobs::FsBlobStore;
pub use error::ApiError;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::db::SqliteStore;

/// Largest accepted request body (image uploads).
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub blobs: Arc<FsBlobStore>,
    pub api_keys: Arc<ApiKeyStore>,
}

/// Builds the full router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(routes::health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/rest/{collection}",
            post(routes::insert).patch(routes::update),
        )
        .route("/rest/{collection}/select", post(routes::select))
        .route("/rest/{collection}/delete", post(routes::delete))
        .route("/rest/{collection}/count", post(routes::count))
        .route("/realtime/{collection}", get(realtime::realtime))
        .route("/storage/remove", post(routes::remove_blobs))
        .route(
            "/storage/{name}",
            put(routes::upload_blob).get(routes::download_blob),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}
