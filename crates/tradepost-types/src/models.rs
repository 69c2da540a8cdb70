use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public view of a user. The password hash never leaves the DB layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Abbreviated user embedded in services, messages, and ratings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
}

/// A marketplace listing. `avg_rating`/`ratings_count` are computed per
/// request by a grouped aggregate query, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: i64,
    pub user_id: i64,
    pub owner: UserSummary,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub equity_percentage: Option<f64>,
    pub needs: Option<String>,
    pub avg_rating: Option<f64>,
    pub ratings_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Abbreviated service embedded in messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub id: i64,
    pub title: String,
}

/// A direct message. Rows are append-only; there is no conversation entity —
/// threads are derived at read time from the (sender, receiver, service)
/// columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub service_id: Option<i64>,
    pub subject: Option<String>,
    pub content: String,
    pub sender: UserSummary,
    pub receiver: UserSummary,
    pub service: Option<ServiceSummary>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: i64,
    pub user_id: i64,
    pub service_id: i64,
    pub score: i64,
    pub comment: Option<String>,
    pub user: UserSummary,
    pub created_at: DateTime<Utc>,
}
