use axum::{
    Json,
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use caldate_payloads::{ErrorBody, FieldErrors};
use thiserror::Error;
use tracing::{debug, error};

use crate::{database::StoreError, storage::StorageError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid data")]
    InvalidData(FieldErrors),

    #[error("Username already taken")]
    HandleTaken,

    #[error("File too large")]
    PayloadTooLarge,

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn internal(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        AppError::InternalError(error.into())
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::HandleTaken => AppError::HandleTaken,
            StoreError::GalleryFull => AppError::bad_request(GALLERY_FULL),
            StoreError::UserNotFound => AppError::NotFound("User not found"),
            other => AppError::internal(other),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        AppError::internal(error)
    }
}

impl From<MultipartError> for AppError {
    fn from(error: MultipartError) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::bad_request(error.body_text())
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        AppError::bad_request("Invalid data")
    }
}

pub const GALLERY_FULL: &str = "Maximum 6 photos allowed";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::BadRequest { .. } | AppError::InvalidData { .. } => StatusCode::BAD_REQUEST,
            AppError::HandleTaken => StatusCode::CONFLICT,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match self {
            AppError::InvalidData(details) => ErrorBody {
                error: "Invalid data".to_string(),
                details: Some(details),
            },
            AppError::InternalError(e) => {
                error!("Internal error: {e}");
                ErrorBody::new("Internal error")
            }
            other => ErrorBody::new(other.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AppError::NotFound("User not found"), StatusCode::NOT_FOUND),
            (AppError::bad_request("No file provided"), StatusCode::BAD_REQUEST),
            (AppError::HandleTaken, StatusCode::CONFLICT),
            (AppError::PayloadTooLarge, StatusCode::PAYLOAD_TOO_LARGE),
            (AppError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_store_errors() {
        assert!(matches!(
            AppError::from(StoreError::HandleTaken),
            AppError::HandleTaken
        ));
        assert!(matches!(
            AppError::from(StoreError::GalleryFull),
            AppError::BadRequest(message) if message == GALLERY_FULL
        ));
        assert!(matches!(
            AppError::from(StoreError::Contention),
            AppError::InternalError(_)
        ));
    }
}
