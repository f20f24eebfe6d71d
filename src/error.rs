use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::models::FieldErrors;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document {0} changed while it was being updated")]
    Conflict(String),

    #[error("malformed document: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum IdentityError {
    /// Message from the provider, passed through untouched.
    #[error("{0}")]
    Rejected(String),

    #[error("identity request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed identity response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set in the environment")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(FieldErrors),

    #[error("No book with such id")]
    NotFound,

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Recent sign in required")]
    RecentSignInRequired,

    #[error("Not signed in")]
    Unauthorized,

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound,
            other => AppError::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "success": false, "errors": errors })),
            )
                .into_response(),
            AppError::Identity(IdentityError::Rejected(message)) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": message })),
            )
                .into_response(),
            AppError::Store(StoreError::Conflict(ref id)) => {
                tracing::warn!(book_id = %id, "concurrent write rejected");
                (StatusCode::CONFLICT, Json(json!({ "error": self.to_string() }))).into_response()
            }
            other => {
                let status = match other {
                    AppError::NotFound => StatusCode::NOT_FOUND,
                    AppError::RecentSignInRequired | AppError::Unauthorized => {
                        StatusCode::UNAUTHORIZED
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!(error = %other, "request failed");
                }
                (status, Json(json!({ "error": other.to_string() }))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_document_maps_to_not_found() {
        let err: AppError = StoreError::NotFound("books/x".to_string()).into();
        assert!(matches!(err, AppError::NotFound));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_unprocessable() {
        let err = AppError::Validation(FieldErrors::single("title", "Title is required."));
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn provider_message_is_kept_verbatim() {
        let err = AppError::from(IdentityError::Rejected("EMAIL_EXISTS".to_string()));
        assert_eq!(err.to_string(), "EMAIL_EXISTS");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = AppError::from(StoreError::Conflict("b1".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
