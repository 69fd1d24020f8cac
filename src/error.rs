//! Service-level error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::directory::DirectoryError;
use crate::provider::{CipherError, ProviderError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::AlreadyExists(_) => StatusCode::CONFLICT,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ServiceError::NotFound(err.to_string()),
            StoreError::AlreadyExists { .. } => ServiceError::AlreadyExists(err.to_string()),
            StoreError::Malformed { .. } | StoreError::Backend(_) => {
                ServiceError::Internal(err.to_string())
            }
        }
    }
}

impl From<ProviderError> for ServiceError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(_) => ServiceError::NotFound(err.to_string()),
            ProviderError::NotInstalled(_) => ServiceError::Validation(err.to_string()),
            ProviderError::Unavailable { .. } => ServiceError::ProviderUnavailable(err.to_string()),
            ProviderError::Other(_) => ServiceError::Internal(err.to_string()),
        }
    }
}

impl From<DirectoryError> for ServiceError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(_) => ServiceError::NotFound(err.to_string()),
            DirectoryError::Unavailable(_) => ServiceError::ProviderUnavailable(err.to_string()),
        }
    }
}

impl From<CipherError> for ServiceError {
    fn from(err: CipherError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = axum::Json(serde_json::json!({
            "code": status.as_u16(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
