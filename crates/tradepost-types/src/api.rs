use serde::{Deserialize, Serialize};

use crate::models::{Message, Service, User};

// -- JWT Claims --

/// JWT claims shared between token issuance (login/register) and the REST
/// middleware. Canonical definition lives here in tradepost-types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub description: Option<String>,
}

// -- Services --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateServiceRequest {
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub equity_percentage: Option<f64>,
    pub needs: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateServiceRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub equity_percentage: Option<f64>,
    pub needs: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceListResponse {
    pub services: Vec<Service>,
    pub limit: u32,
    pub offset: u32,
    pub total: i64,
    pub has_more: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageRequest {
    pub receiver_id: i64,
    pub content: String,
    pub service_id: Option<i64>,
    pub subject: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub root: Message,
    pub messages: Vec<Message>,
}

// -- Ratings --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateRatingRequest {
    pub service_id: i64,
    pub score: i64,
    pub comment: Option<String>,
}
