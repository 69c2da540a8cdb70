use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::AppState;
use crate::error::ApiError;

/// Extract and validate the bearer JWT, then attach the claims as a request
/// extension for downstream handlers. Secrets come from `AppState`, not the
/// environment, so tests can construct their own.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::Unauthorized("Missing or invalid Authorization header".to_string())
        })?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ApiError::Unauthorized("Missing or invalid Authorization header".to_string())
        })?;

    let claims = state.auth.verify(token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
