//! Database row types — these map directly to SQLite rows.
//! Distinct from the tradepost-types API models to keep the DB layer
//! independent; the API layer joins usernames/titles in and parses the
//! timestamp strings.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ServiceRow {
    pub id: i64,
    pub user_id: i64,
    pub owner_username: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub equity_percentage: Option<f64>,
    pub needs: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub service_id: Option<i64>,
    pub subject: Option<String>,
    pub content: String,
    pub sender_username: String,
    pub receiver_username: String,
    pub service_title: Option<String>,
    pub created_at: String,
}

pub struct RatingRow {
    pub id: i64,
    pub user_id: i64,
    pub service_id: i64,
    pub score: i64,
    pub comment: Option<String>,
    pub username: String,
    pub created_at: String,
}

/// One row of the grouped rating aggregate, keyed by service.
pub struct RatingAggregate {
    pub service_id: i64,
    pub avg_rating: f64,
    pub ratings_count: i64,
}
