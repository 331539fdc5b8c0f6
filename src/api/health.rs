use axum::{extract::State, response::IntoResponse, Json};

use crate::server::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let storage = match state.files.stats().await {
        Ok(stats) => serde_json::json!(stats),
        Err(e) => {
            tracing::warn!(error = %e, "storage stats unavailable");
            serde_json::json!({ "error": "storage stats unavailable" })
        }
    };

    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CDN_FILESERVER_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "storage": storage,
    }))
}
