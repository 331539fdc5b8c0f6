use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::Router;
use http::{header, HeaderValue, Method};
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{download, files, health};
use crate::auth::middleware::{optional_auth, require_permission};
use crate::config::{Config, Permission};
use crate::service::FileService;

/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub files: Arc<FileService>,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(files: FileService, config: Config) -> Self {
        Self {
            files: Arc::new(files),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    response
}

fn cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if config.cors_origins.iter().any(|o| o.trim() == "*") {
        return base.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.trim().parse().ok())
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

pub fn build_router(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route("/upload", post(files::upload))
        .route_layer(axum::middleware::from_fn_with_state(
            (state.clone(), Permission::Upload),
            require_permission,
        ));

    let list_routes = Router::new()
        .route("/api/files", get(files::list))
        .route_layer(axum::middleware::from_fn_with_state(
            (state.clone(), Permission::List),
            require_permission,
        ));

    let delete_routes = Router::new()
        .route("/api/files/{tag}/{file_id}", delete(files::delete))
        .route_layer(axum::middleware::from_fn_with_state(
            (state.clone(), Permission::Delete),
            require_permission,
        ));

    let download_routes = Router::new()
        .route("/{tag}/{file_id}", get(download::download))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            optional_auth,
        ));

    let body_limit = usize::try_from(state.config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health::health))
        .merge(upload_routes)
        .merge(list_routes)
        .merge(delete_routes)
        .merge(download_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(security_headers))
        .layer(cors_layer(&state.config))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
