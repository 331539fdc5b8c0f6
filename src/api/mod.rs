pub mod download;
pub mod files;
pub mod health;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

/// Standard success envelope: `{"success": true, "message": ..., "data": ...}`.
pub(crate) fn success<T: Serialize>(message: &str, data: T) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "message": message,
            "data": data,
        })),
    )
        .into_response()
}

/// Lenient boolean parsing for form and query values.
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
