use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use tradepost_db::models::MessageRow;
use tradepost_types::api::{Claims, SendMessageRequest, ThreadResponse};
use tradepost_types::models::{Message, ServiceSummary, UserSummary};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::{blocking, parse_timestamp};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

pub(crate) fn message_view(row: MessageRow) -> Message {
    let service = match (row.service_id, row.service_title) {
        (Some(id), Some(title)) => Some(ServiceSummary { id, title }),
        _ => None,
    };
    Message {
        id: row.id,
        sender_id: row.sender_id,
        receiver_id: row.receiver_id,
        service_id: row.service_id,
        subject: row.subject,
        content: row.content,
        sender: UserSummary {
            id: row.sender_id,
            username: row.sender_username,
        },
        receiver: UserSummary {
            id: row.receiver_id,
            username: row.receiver_username,
        },
        service,
        created_at: parse_timestamp(&row.created_at),
    }
}

/// Messages are immutable rows; sending is the only mutation and has no side
/// effects beyond the insert.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.receiver_id <= 0 {
        return Err(ApiError::Validation(
            "receiverId must be a positive number".to_string(),
        ));
    }
    if req.receiver_id == claims.sub {
        return Err(ApiError::Validation(
            "You cannot send a message to yourself".to_string(),
        ));
    }
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::Validation(
            "Message content cannot be empty".to_string(),
        ));
    }
    let subject = req
        .subject
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let db = state.clone();
    let sender_id = claims.sub;
    let receiver_id = req.receiver_id;
    let service_id = req.service_id;
    let row = blocking(move || {
        if db.db.get_user_by_id(receiver_id)?.is_none() {
            return Err(ApiError::NotFound("Receiver not found".to_string()));
        }
        if let Some(sid) = service_id {
            if db.db.get_service(sid)?.is_none() {
                return Err(ApiError::NotFound("Service not found".to_string()));
            }
        }
        db.db
            .insert_message(sender_id, receiver_id, service_id, subject.as_deref(), &content)
            .map_err(ApiError::from)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message_view(row))))
}

pub async fn inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let db = state.clone();
    let user_id = claims.sub;
    let limit = query.limit.min(200);
    let offset = query.offset;

    let rows = blocking(move || db.db.inbox(user_id, limit, offset).map_err(ApiError::from)).await?;

    Ok(Json(rows.into_iter().map(message_view).collect()))
}

pub async fn sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let db = state.clone();
    let user_id = claims.sub;
    let limit = query.limit.min(200);
    let offset = query.offset;

    let rows = blocking(move || db.db.sent(user_id, limit, offset).map_err(ApiError::from)).await?;

    Ok(Json(rows.into_iter().map(message_view).collect()))
}

/// One conversation, reconstructed from the flat message table: the root
/// message anchors the counterpart and the service scope, then every message
/// between the pair with that same scope comes back oldest-first. A NULL
/// service scope only matches other NULL-scoped messages.
pub async fn thread(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ThreadResponse>> {
    let db = state.clone();
    let root = blocking(move || db.db.get_message(id).map_err(ApiError::from))
        .await?
        .ok_or_else(|| ApiError::NotFound("Message not found".to_string()))?;

    let me = claims.sub;
    if root.sender_id != me && root.receiver_id != me {
        return Err(ApiError::Forbidden(
            "You are not part of this conversation".to_string(),
        ));
    }

    let counterpart = if root.sender_id == me {
        root.receiver_id
    } else {
        root.sender_id
    };
    let service_id = root.service_id;

    let db = state.clone();
    let rows =
        blocking(move || db.db.thread(me, counterpart, service_id).map_err(ApiError::from)).await?;

    Ok(Json(ThreadResponse {
        root: message_view(root),
        messages: rows.into_iter().map(message_view).collect(),
    }))
}
