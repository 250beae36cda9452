use crate::services::error::PipelineError;
use crate::services::video_store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Gateway Timeout: {0}")]
    GatewayTimeout(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidInput(msg) => AppError::BadRequest(msg),
            e @ PipelineError::PayloadTooLarge { .. } => AppError::PayloadTooLarge(e.to_string()),
            e @ PipelineError::Unauthenticated => AppError::Unauthorized(e.to_string()),
            PipelineError::Unauthorized(_) => {
                AppError::Forbidden("Access to this video is not allowed".to_string())
            }
            PipelineError::NotFound(id) => AppError::NotFound(format!("Video {} not found", id)),
            PipelineError::RecordStore(StoreError::Conflict(id)) => AppError::Conflict(format!(
                "Video {} was modified concurrently, retry the request",
                id
            )),
            e @ PipelineError::TimedOut { .. } => AppError::GatewayTimeout(e.to_string()),
            e @ PipelineError::UploadedButUnreferenced { .. } => {
                tracing::error!(alert = "uploaded_but_unreferenced", "{}", e);
                AppError::Internal(e.to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::GatewayTimeout(msg) => {
                tracing::warn!("Deadline exceeded: {}", msg);
                (StatusCode::GATEWAY_TIMEOUT, "Upstream timed out".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
