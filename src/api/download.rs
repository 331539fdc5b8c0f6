use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Extension,
};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::server::AppState;

use super::parse_bool;

const PUBLIC_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    download: Option<String>,
}

/// ASCII fallback for the quoted `filename=` parameter; strips characters
/// that could break out of the header value.
fn ascii_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && *c != '"' && *c != '\\')
        .collect()
}

fn content_disposition(original_name: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_filename(original_name),
        utf8_percent_encode(original_name, NON_ALPHANUMERIC)
    )
}

pub async fn download(
    State(state): State<AppState>,
    Path((tag, file_id)): Path<(String, String)>,
    Query(params): Query<DownloadParams>,
    Extension(Caller(identity)): Extension<Caller>,
) -> Result<Response, ApiError> {
    let (meta, path) = state.files.download(&tag, &file_id).await.map_err(|e| {
        tracing::debug!(tag = %tag, file_id = %file_id, error = %e, "download lookup failed");
        ApiError::from(e)
    })?;

    if !meta.public && identity.is_none() {
        tracing::warn!(tag = %tag, file_id = %file_id, "unauthorized access to private file");
        return Err(ApiError::forbidden(
            "This file is private and requires authentication",
        ));
    }

    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        // Removed after the lookup.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ApiError::not_found()),
        Err(e) => return Err(ApiError::internal(e)),
    };
    let length = file.metadata().await.map_err(ApiError::internal)?.len();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", &meta.content_type)
        .header("Content-Length", length.to_string());
    if meta.public {
        builder = builder.header("Cache-Control", PUBLIC_CACHE_CONTROL);
    }
    if params.download.as_deref().and_then(parse_bool) == Some(true) {
        builder = builder.header("Content-Disposition", content_disposition(&meta.original_name));
    }

    let body = Body::from_stream(ReaderStream::new(file));
    builder.body(body).map_err(ApiError::internal)
}

#[cfg(test)]
mod tests {
    use super::content_disposition;

    #[test]
    fn disposition_escapes_quotes_and_unicode() {
        let value = content_disposition("ré\"port.pdf");
        assert!(value.starts_with("attachment; filename=\"rport.pdf\""));
        assert!(value.contains("filename*=UTF-8''r%C3%A9%22port%2Epdf"));
    }
}
