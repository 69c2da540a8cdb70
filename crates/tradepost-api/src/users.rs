use axum::{
    Extension,
    extract::{Path, State},
};

use tradepost_db::models::UserRow;
use tradepost_types::api::{Claims, UpdateProfileRequest};
use tradepost_types::models::User;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::extract::Json;
use crate::{blocking, parse_timestamp};

pub(crate) fn user_view(row: UserRow) -> User {
    User {
        id: row.id,
        username: row.username,
        email: row.email,
        description: row.description,
        created_at: parse_timestamp(&row.created_at),
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<Json<Vec<User>>> {
    let db = state.clone();
    let rows = blocking(move || db.db.list_users().map_err(ApiError::from)).await?;

    Ok(Json(rows.into_iter().map(user_view).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<Json<User>> {
    let db = state.clone();
    let row = blocking(move || db.db.get_user_by_id(id).map_err(ApiError::from))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user_view(row)))
}

/// Profile edits are self-only; there is no admin role.
pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    if claims.sub != id {
        return Err(ApiError::Forbidden(
            "You can only edit your own profile".to_string(),
        ));
    }

    let username = match req.username.as_deref().map(str::trim) {
        Some(u) if u.len() < 3 || u.len() > 32 => {
            return Err(ApiError::Validation(
                "Username must be between 3 and 32 characters".to_string(),
            ));
        }
        Some(u) => Some(u.to_string()),
        None => None,
    };
    let description = req.description.as_deref().map(str::trim).map(String::from);

    let db = state.clone();
    let row = blocking(move || {
        if let Some(ref new_name) = username {
            if let Some(existing) = db.db.get_user_by_username(new_name)? {
                if existing.id != id {
                    return Err(ApiError::Validation("Username already taken".to_string()));
                }
            }
        }
        db.db
            .update_user_profile(id, username.as_deref(), description.as_deref())
            .map_err(ApiError::from)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user_view(row)))
}
