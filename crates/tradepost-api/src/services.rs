use std::collections::HashMap;

use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;

use tradepost_db::models::ServiceRow;
use tradepost_types::api::{Claims, CreateServiceRequest, ServiceListResponse, UpdateServiceRequest};
use tradepost_types::models::{Service, UserSummary};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::{blocking, parse_timestamp};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesQuery {
    pub user_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    12
}

/// Equity percentages live on a 0.5-step grid. Bounds are checked on the raw
/// input, so 0.3 is rejected rather than rounded up to 0.5.
fn normalize_equity(raw: f64) -> Result<f64, ApiError> {
    if !raw.is_finite() || raw < 0.5 || raw > 99.5 {
        return Err(ApiError::Validation(
            "Equity percentage must be between 0.5 and 99.5".to_string(),
        ));
    }
    Ok((raw * 2.0).round() / 2.0)
}

pub(crate) fn service_view(row: ServiceRow, agg: Option<(f64, i64)>) -> Service {
    let (avg_rating, ratings_count) = match agg {
        Some((avg, count)) => (Some(avg), count),
        None => (None, 0),
    };
    Service {
        id: row.id,
        user_id: row.user_id,
        owner: UserSummary {
            id: row.user_id,
            username: row.owner_username,
        },
        title: row.title,
        description: row.description,
        price: row.price,
        equity_percentage: row.equity_percentage,
        needs: row.needs,
        avg_rating,
        ratings_count,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

/// Batch rating aggregates, defensively: if the grouped query fails the
/// listing still goes out with null aggregates instead of a 500.
async fn aggregates_for(state: &AppState, ids: Vec<i64>) -> HashMap<i64, (f64, i64)> {
    let db = state.clone();
    match blocking(move || db.db.rating_aggregates(&ids).map_err(ApiError::from)).await {
        Ok(aggs) => aggs
            .into_iter()
            .map(|a| (a.service_id, (a.avg_rating, a.ratings_count)))
            .collect(),
        Err(e) => {
            warn!("rating aggregate query failed, returning null aggregates: {}", e);
            HashMap::new()
        }
    }
}

pub async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<ServicesQuery>,
) -> ApiResult<Json<ServiceListResponse>> {
    let limit = query.limit.clamp(1, 50);
    let offset = query.offset;
    let owner_id = query.user_id;

    let db = state.clone();
    let (rows, total) =
        blocking(move || db.db.list_services(owner_id, limit, offset).map_err(ApiError::from))
            .await?;

    let ids: Vec<i64> = rows.iter().map(|s| s.id).collect();
    let mut agg_map = aggregates_for(&state, ids).await;

    let services: Vec<Service> = rows
        .into_iter()
        .map(|row| {
            let agg = agg_map.remove(&row.id);
            service_view(row, agg)
        })
        .collect();

    let has_more = (offset as i64 + services.len() as i64) < total;

    Ok(Json(ServiceListResponse {
        services,
        limit,
        offset,
        total,
        has_more,
    }))
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Service>> {
    let db = state.clone();
    let row = blocking(move || db.db.get_service(id).map_err(ApiError::from))
        .await?
        .ok_or_else(|| ApiError::NotFound("Service not found".to_string()))?;

    let agg = aggregates_for(&state, vec![id]).await.remove(&id);
    Ok(Json(service_view(row, agg)))
}

pub async fn create_service(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateServiceRequest>,
) -> ApiResult<impl IntoResponse> {
    let title = req.title.trim().to_string();
    let description = req.description.trim().to_string();
    if title.is_empty() || description.is_empty() {
        return Err(ApiError::Validation(
            "Title and description are required".to_string(),
        ));
    }

    let price = match req.price {
        None => 0.0,
        Some(p) if !p.is_finite() || p < 0.0 => {
            return Err(ApiError::Validation(
                "Price must be a non-negative number".to_string(),
            ));
        }
        Some(p) => p,
    };
    let equity = req.equity_percentage.map(normalize_equity).transpose()?;
    let needs = req
        .needs
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let db = state.clone();
    let owner_id = claims.sub;
    let row = blocking(move || {
        db.db
            .insert_service(
                owner_id,
                &title,
                &description,
                price,
                equity,
                needs.as_deref(),
            )
            .map_err(ApiError::from)
    })
    .await?;

    // A fresh service has no ratings yet.
    Ok((StatusCode::CREATED, Json(service_view(row, None))))
}

pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateServiceRequest>,
) -> ApiResult<Json<Service>> {
    let existing = fetch_owned(&state, id, &claims).await?;

    // Merge the patch; blank strings keep the stored value.
    let title = match req.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => existing.title,
    };
    let description = match req.description.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => existing.description,
    };
    let price = match req.price {
        None => existing.price,
        Some(p) if !p.is_finite() || p < 0.0 => {
            return Err(ApiError::Validation(
                "Price must be a non-negative number".to_string(),
            ));
        }
        Some(p) => p,
    };
    let equity = match req.equity_percentage {
        None => existing.equity_percentage,
        Some(raw) => Some(normalize_equity(raw)?),
    };
    let needs = match req.needs.as_deref().map(str::trim) {
        None => existing.needs,
        Some("") => None,
        Some(n) => Some(n.to_string()),
    };

    let db = state.clone();
    let row = blocking(move || {
        db.db
            .update_service(id, &title, &description, price, equity, needs.as_deref())
            .map_err(ApiError::from)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("Service not found".to_string()))?;

    let agg = aggregates_for(&state, vec![id]).await.remove(&id);
    Ok(Json(service_view(row, agg)))
}

pub async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<serde_json::Value>> {
    fetch_owned(&state, id, &claims).await?;

    let db = state.clone();
    let deleted = blocking(move || db.db.delete_service(id).map_err(ApiError::from)).await?;
    if !deleted {
        return Err(ApiError::NotFound("Service not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "message": "Service deleted" })))
}

/// Guard ladder shared by update/delete: 400 on a bad id, 404 when the row
/// is missing, 403 when the caller is not the owner — before any payload
/// validation, so a non-owner always sees 403.
async fn fetch_owned(state: &AppState, id: i64, claims: &Claims) -> Result<ServiceRow, ApiError> {
    if id <= 0 {
        return Err(ApiError::Validation("Invalid service id".to_string()));
    }

    let db = state.clone();
    let row = blocking(move || db.db.get_service(id).map_err(ApiError::from))
        .await?
        .ok_or_else(|| ApiError::NotFound("Service not found".to_string()))?;

    if row.user_id != claims.sub {
        return Err(ApiError::Forbidden("You do not own this service".to_string()));
    }

    Ok(row)
}
