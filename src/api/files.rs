use axum::{
    extract::{Multipart, Path, Query, State},
    response::Response,
    Extension,
};
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::server::AppState;
use crate::service::{ListQuery, UploadRequest};
use crate::storage::{FileMeta, ScanFilter};

use super::{parse_bool, success};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

fn malformed(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::validation(&format!("Malformed upload: {}", e))
}

/// Multipart upload. The `file` part is streamed straight into storage, so
/// `tag` and `public` must come before it; later fields are not read.
pub async fn upload(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let max = state.files.settings().max_file_size;
    let mut tag = None;
    let mut public = false;

    while let Some(mut field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("tag") => {
                let value = field.text().await.map_err(malformed)?;
                tag = Some(value.trim().to_string());
            }
            Some("public") => {
                let value = field.text().await.map_err(malformed)?;
                public = parse_bool(&value).unwrap_or(false);
            }
            Some("file") => {
                let Some(tag) = tag.take().filter(|t| !t.is_empty()) else {
                    return Err(ApiError::validation("Tag is required before the file"));
                };
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::validation("File is required"))?;

                // Bytes seen so far; the service re-checks what it writes.
                let first = field.chunk().await.map_err(malformed)?.unwrap_or_default();
                let req = UploadRequest {
                    tag,
                    filename,
                    size_hint: first.len() as i64,
                    public,
                    uploaded_by: identity.name,
                };

                let rest = field.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
                let reader = StreamReader::new(stream::iter([Ok(first)]).chain(rest));
                let body = reader.take(max.saturating_add(1));

                let result = state.files.upload(req, Box::pin(body)).await.map_err(|e| {
                    tracing::warn!(error = %e, "file upload failed");
                    ApiError::from(e)
                })?;
                return Ok(success("File uploaded successfully", result));
            }
            _ => {}
        }
    }

    tracing::warn!("upload without file");
    Err(ApiError::validation("File is required"))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    tag: Option<String>,
    public: Option<String>,
    search: Option<String>,
    page: Option<String>,
    limit: Option<String>,
    sort: Option<String>,
}

#[derive(Serialize)]
struct FileEntry {
    #[serde(flatten)]
    meta: FileMeta,
    url: String,
}

#[derive(Serialize)]
struct Pagination {
    current_page: usize,
    total_pages: usize,
    total_items: usize,
    items_per_page: usize,
    has_next: bool,
    has_prev: bool,
}

fn build_pagination(page: usize, limit: usize, total: usize) -> Pagination {
    let total_pages = total.div_ceil(limit).max(1);
    Pagination {
        current_page: page,
        total_pages,
        total_items: total,
        items_per_page: limit,
        has_next: page < total_pages,
        has_prev: page > 1,
    }
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let page = params
        .page
        .as_deref()
        .and_then(|p| p.trim().parse::<usize>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1);
    let limit = params
        .limit
        .as_deref()
        .and_then(|l| l.trim().parse::<usize>().ok())
        .filter(|l| *l >= 1)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);
    let descending = params.sort.as_deref().unwrap_or("desc") == "desc";

    let query = ListQuery {
        filter: ScanFilter {
            tag: params.tag.filter(|t| !t.is_empty()),
            public: params.public.as_deref().and_then(parse_bool),
            search: params.search.filter(|s| !s.is_empty()),
        },
        page,
        page_size: limit,
        descending,
    };

    let result = state.files.list(&query).await?;

    let files: Vec<FileEntry> = result
        .files
        .into_iter()
        .map(|meta| FileEntry {
            url: state.files.file_url(&meta.tag, &meta.file_id),
            meta,
        })
        .collect();

    Ok(success(
        "Files retrieved successfully",
        serde_json::json!({
            "files": files,
            "pagination": build_pagination(page, limit, result.total),
        }),
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((tag, file_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state.files.delete(&tag, &file_id).await?;

    Ok(success(
        "File deleted successfully",
        serde_json::json!({
            "file_id": file_id,
            "tag": tag,
            "deleted_at": chrono::Utc::now(),
        }),
    ))
}
