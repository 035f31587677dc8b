/// Server error types
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mobility_core::CoreError;
use mobility_sync::SyncError;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Core(#[from] CoreError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<mobility_storage::StorageError> for ServerError {
    fn from(err: mobility_storage::StorageError) -> Self {
        // StorageError -> CoreError -> ServerError
        ServerError::Core(err.into())
    }
}

impl ServerError {
    fn status_and_message(self) -> (StatusCode, String) {
        match self {
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ServerError::Core(CoreError::NotFound { entity, id }) => {
                (StatusCode::NOT_FOUND, format!("{entity} not found: {id}"))
            }
            ServerError::Core(CoreError::InvalidInput(msg)) => (StatusCode::BAD_REQUEST, msg),
            ServerError::Sync(SyncError::JobNotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("Job not found: {id}"))
            }
            ServerError::Sync(SyncError::Core(core)) => ServerError::Core(core).status_and_message(),
            ServerError::Core(ref e) => {
                tracing::error!("Storage error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                )
            }
            ServerError::Sync(ref e) => {
                tracing::error!("Sync error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ServerError::Config(ref msg) => {
                tracing::error!("Config error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Configuration error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
