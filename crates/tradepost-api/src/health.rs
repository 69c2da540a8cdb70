use axum::extract::State;

use crate::auth::AppState;
use crate::blocking;
use crate::extract::Json;

/// Liveness probe. Never fails the request; a broken database shows up as
/// `"db": "error"` instead.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db = state.clone();
    let status = match blocking(move || db.db.ping().map_err(Into::into)).await {
        Ok(()) => "ready",
        Err(_) => "error",
    };

    Json(serde_json::json!({ "ok": true, "db": status }))
}
