use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("expired: {0}")]
    Expired(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Machine-readable error code string.
    fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Expired(_) => "POLL_EXPIRED",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Expired(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        let message = match &self {
            ApiError::Internal(err) => {
                tracing::error!("API internal error: {err:#}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "code": code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

impl From<classpulse_core::error::CoreError> for ApiError {
    fn from(e: classpulse_core::error::CoreError) -> Self {
        use classpulse_core::error::CoreError;
        match e {
            CoreError::Validation(msg) => ApiError::BadRequest(msg),
            CoreError::Conflict(msg) => ApiError::Conflict(msg),
            CoreError::Expired(msg) => ApiError::Expired(msg),
            CoreError::NotFound => ApiError::NotFound,
            CoreError::Unavailable(msg) => ApiError::ServiceUnavailable(msg),
        }
    }
}

impl From<classpulse_db::DbError> for ApiError {
    fn from(e: classpulse_db::DbError) -> Self {
        match e {
            classpulse_db::DbError::NotFound => ApiError::NotFound,
            other => ApiError::ServiceUnavailable(other.to_string()),
        }
    }
}
