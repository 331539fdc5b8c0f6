use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;

use crate::service::FileError;

#[derive(Debug)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    InvalidNamespace,
    FileTooLarge,
    EmptyFile,
    ExtensionNotAllowed,
    ValidationFailed,
    NotFound,
    Unauthorized,
    Forbidden,
    StorageFailure,
}

impl ApiErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidNamespace => "InvalidNamespace",
            Self::FileTooLarge => "FileTooLarge",
            Self::EmptyFile => "EmptyFile",
            Self::ExtensionNotAllowed => "ExtensionNotAllowed",
            Self::ValidationFailed => "ValidationFailed",
            Self::NotFound => "NotFound",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::StorageFailure => "StorageFailure",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl ApiError {
    fn new(code: ApiErrorCode, message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail,
        }
    }

    /// Storage failures never expose paths or raw IO errors to the caller.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "internal error");
        Self::new(
            ApiErrorCode::StorageFailure,
            "Internal Server Error",
            Some("The request could not be completed. Please try again.".into()),
        )
    }

    pub fn not_found() -> Self {
        Self::new(ApiErrorCode::NotFound, "Not Found", Some("File not found".into()))
    }

    pub fn unauthorized() -> Self {
        Self::new(
            ApiErrorCode::Unauthorized,
            "Unauthorized",
            Some("Invalid or missing token".into()),
        )
    }

    pub fn forbidden(msg: &str) -> Self {
        Self::new(ApiErrorCode::Forbidden, "Forbidden", Some(msg.to_string()))
    }

    pub fn validation(msg: &str) -> Self {
        Self::new(ApiErrorCode::ValidationFailed, "Validation error", Some(msg.to_string()))
    }
}

impl From<FileError> for ApiError {
    fn from(err: FileError) -> Self {
        let code = match &err {
            FileError::InvalidNamespace(_) => ApiErrorCode::InvalidNamespace,
            FileError::FileTooLarge { .. } => ApiErrorCode::FileTooLarge,
            FileError::EmptyFile => ApiErrorCode::EmptyFile,
            FileError::ExtensionNotAllowed(_) => ApiErrorCode::ExtensionNotAllowed,
            FileError::NotFound => return Self::not_found(),
            FileError::CorruptMetadata(_) | FileError::Storage(_) => return Self::internal(&err),
        };
        Self::new(code, "Validation error", Some(err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::new_v4().to_string();
        let body = serde_json::json!({
            "success": false,
            "message": self.message,
            "code": self.code.as_str(),
            "error": self.detail,
            "request_id": request_id,
        });
        (
            self.code.status_code(),
            [("x-request-id", request_id.as_str())],
            Json(body),
        )
            .into_response()
    }
}
