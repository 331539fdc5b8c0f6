use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::config::Permission;
use crate::error::ApiError;
use crate::server::AppState;

use super::{extract_token, resolve, Caller};

/// Require a valid token carrying `permission`.
pub async fn require_permission(
    State((state, permission)): State<(AppState, Permission)>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();
    let Some(key) = extract_token(request.headers(), request.uri().query()) else {
        tracing::warn!(path = %path, "missing authentication token");
        return Err(ApiError::unauthorized());
    };

    let Some(identity) = resolve(&state.config, &key) else {
        tracing::warn!(path = %path, "invalid authentication token");
        return Err(ApiError::unauthorized());
    };

    if !identity.can(permission) {
        tracing::warn!(
            path = %path,
            token_name = %identity.name,
            required = permission.as_str(),
            "insufficient permissions"
        );
        return Err(ApiError::forbidden(&format!(
            "Token does not have {} permission",
            permission.as_str()
        )));
    }

    tracing::debug!(token_name = %identity.name, path = %path, "authenticated");
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Attach the caller if a valid token is present; never rejects.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = extract_token(request.headers(), request.uri().query())
        .and_then(|key| resolve(&state.config, &key));
    if let Some(id) = &identity {
        tracing::debug!(token_name = %id.name, "optional authentication succeeded");
    }
    request.extensions_mut().insert(Caller(identity));
    next.run(request).await
}
