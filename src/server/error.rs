use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shoplist_core::store::{BlobError, StoreError};

/// Error body returned by every failing route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Store or blob failure, mapped onto an HTTP status.
#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    Blob(BlobError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(StoreError::UnknownCollection(_) | StoreError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Store(e) if e.is_rejection() => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Blob(BlobError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            ApiError::Blob(BlobError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Blob(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Store(e) => write!(f, "{}", e),
            ApiError::Blob(e) => write!(f, "{}", e),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<BlobError> for ApiError {
    fn from(e: BlobError) -> Self {
        ApiError::Blob(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
