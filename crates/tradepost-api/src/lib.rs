pub mod auth;
pub mod error;
pub mod extract;
pub mod health;
pub mod messages;
pub mod middleware;
pub mod ratings;
pub mod services;
pub mod users;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::auth::AppState;
use crate::error::ApiError;

/// Full API surface. The server binary wraps this in CORS/trace layers;
/// tests drive it directly.
pub fn router(state: AppState) -> Router {
    let auth_layer = from_fn_with_state(state.clone(), middleware::require_auth);

    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/users/register", post(auth::register))
        .route("/api/users/login", post(auth::login))
        .route(
            "/api/users",
            get(users::list_users).route_layer(auth_layer.clone()),
        )
        .route(
            "/api/users/{id}",
            get(users::get_user)
                .put(users::update_profile)
                .route_layer(auth_layer.clone()),
        )
        .route(
            "/api/services",
            post(services::create_service)
                .route_layer(auth_layer.clone())
                // Listing stays public; the layer above only covers POST.
                .get(services::list_services),
        )
        .route(
            "/api/services/{id}",
            put(services::update_service)
                .delete(services::delete_service)
                .route_layer(auth_layer.clone())
                .get(services::get_service),
        )
        .route(
            "/api/messages",
            post(messages::send_message).route_layer(auth_layer.clone()),
        )
        .route(
            "/api/messages/inbox",
            get(messages::inbox).route_layer(auth_layer.clone()),
        )
        .route(
            "/api/messages/sent",
            get(messages::sent).route_layer(auth_layer.clone()),
        )
        .route(
            "/api/messages/{id}/thread",
            get(messages::thread).route_layer(auth_layer.clone()),
        )
        .route(
            "/api/ratings",
            post(ratings::create_rating)
                .route_layer(auth_layer)
                .get(ratings::list_ratings),
        )
        .with_state(state)
}

/// Run blocking rusqlite work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Try RFC3339 first, then parse as naive UTC and convert.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
