use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ingest::SourceError;
use pipeline::BatchError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Source(SourceError::Parse(_)) => StatusCode::BAD_REQUEST,
            ApiError::Source(SourceError::Auth(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Source(SourceError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Source(SourceError::Remote(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Source(SourceError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Batch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
