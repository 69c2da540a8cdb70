use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use tradepost_db::models::RatingRow;
use tradepost_types::api::{Claims, CreateRatingRequest};
use tradepost_types::models::{Rating, UserSummary};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::{blocking, parse_timestamp};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingsQuery {
    pub service_id: Option<i64>,
}

fn rating_view(row: RatingRow) -> Rating {
    Rating {
        id: row.id,
        user_id: row.user_id,
        service_id: row.service_id,
        score: row.score,
        comment: row.comment,
        user: UserSummary {
            id: row.user_id,
            username: row.username,
        },
        created_at: parse_timestamp(&row.created_at),
    }
}

pub async fn create_rating(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRatingRequest>,
) -> ApiResult<impl IntoResponse> {
    if !(1..=5).contains(&req.score) {
        return Err(ApiError::Validation(
            "Score must be an integer between 1 and 5".to_string(),
        ));
    }
    let comment = req
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let db = state.clone();
    let user_id = claims.sub;
    let service_id = req.service_id;
    let score = req.score;
    let row = blocking(move || {
        if db.db.get_service(service_id)?.is_none() {
            return Err(ApiError::NotFound("Service not found".to_string()));
        }
        db.db
            .insert_rating(user_id, service_id, score, comment.as_deref())
            .map_err(ApiError::from)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(rating_view(row))))
}

pub async fn list_ratings(
    State(state): State<AppState>,
    Query(query): Query<RatingsQuery>,
) -> ApiResult<Json<Vec<Rating>>> {
    let service_id = query
        .service_id
        .ok_or_else(|| ApiError::Validation("serviceId query parameter is required".to_string()))?;

    let db = state.clone();
    let rows =
        blocking(move || db.db.ratings_for_service(service_id).map_err(ApiError::from)).await?;

    Ok(Json(rows.into_iter().map(rating_view).collect()))
}
