//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::ExecutionError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    BadRequest(String),
    Unavailable(String),
    DatabaseError(sqlx::Error),
    InternalError(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DatabaseError(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unavailable(msg) => msg,
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                "Internal server error".to_string()
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        let message = err.to_string();
        match err {
            ExecutionError::NotFound(_) => ApiError::NotFound(message),
            ExecutionError::Forbidden { .. } => ApiError::Forbidden(message),
            ExecutionError::Conflict(_)
            | ExecutionError::VersionConflict { .. }
            | ExecutionError::InvalidTransition(_)
            | ExecutionError::Filtered(_) => ApiError::Conflict(message),
            ExecutionError::InvalidEvent(_) | ExecutionError::InvalidRequest(_) => {
                ApiError::BadRequest(message)
            }
            ExecutionError::Unavailable(_) => ApiError::Unavailable(message),
            ExecutionError::Database(err) => ApiError::DatabaseError(err),
            ExecutionError::Internal(_) => ApiError::InternalError(message),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
