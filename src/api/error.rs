use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::source::{ApiEnvelope, SourceError};
use crate::storage::StorageError;

/// Failure of an API request, rendered as `{ "success": false, "error": ... }`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Source(SourceError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Source(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidBanner(e) => ApiError::BadRequest(e.to_string()),
            StorageError::NotFound(id) => ApiError::NotFound(format!("banner {id} not found")),
            StorageError::Other(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        // Store internals stay in the log
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "internal error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(ApiEnvelope::<()>::failure(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BannerError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(StorageError::NotFound(3)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StorageError::InvalidBanner(BannerError::EmptyPlacement)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SourceError::Network("refused".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(SourceError::Store("disk".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
