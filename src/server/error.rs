/// HTTP error mapping
///
/// Validation → 400, engine/store conflicts → 409, engine outage → 502,
/// database outage → 500, slow handlers → 408. The body is always `{"error": "..."}`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::core::{ErrorClass, MetricsError, NetworkError, ScrapeConfigError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    EngineUnavailable(String),
    #[error("{0}")]
    Database(String),
    #[error("{0}")]
    Internal(String),
    #[error("Unauthorized - invalid or missing authentication token")]
    Unauthorized,
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::EngineUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        }
    }

    fn from_class(class: ErrorClass, message: String) -> Self {
        match class {
            ErrorClass::Validation => AppError::InvalidInput(message),
            ErrorClass::Conflict => AppError::Conflict(message),
            ErrorClass::Engine => AppError::EngineUnavailable(message),
            ErrorClass::Database => AppError::Database(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<NetworkError> for AppError {
    fn from(err: NetworkError) -> Self {
        AppError::from_class(err.class(), err.to_string())
    }
}

impl From<MetricsError> for AppError {
    fn from(err: MetricsError) -> Self {
        AppError::from_class(err.class(), err.to_string())
    }
}

impl From<ScrapeConfigError> for AppError {
    fn from(err: ScrapeConfigError) -> Self {
        match err {
            ScrapeConfigError::Invalid(msg) => AppError::InvalidInput(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}
