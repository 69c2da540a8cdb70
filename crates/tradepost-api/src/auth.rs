use std::sync::Arc;

use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use tradepost_db::{Database, is_constraint_violation};
use tradepost_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::blocking;
use crate::error::{ApiError, ApiResult};
use crate::extract::Json;
use crate::users::user_view;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub auth: AuthKeys,
}

/// JWT secrets. The first entry signs new tokens; every entry is tried during
/// verification so secrets can be rotated without invalidating live sessions.
pub struct AuthKeys {
    secrets: Vec<String>,
}

impl AuthKeys {
    pub fn new(secrets: Vec<String>) -> anyhow::Result<Self> {
        let secrets: Vec<String> = secrets.into_iter().filter(|s| !s.is_empty()).collect();
        if secrets.is_empty() {
            return Err(anyhow!("at least one JWT secret is required"));
        }
        Ok(Self { secrets })
    }

    fn signing_secret(&self) -> &str {
        &self.secrets[0]
    }

    pub(crate) fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let mut expired = false;
        for secret in &self.secrets {
            match decode::<Claims>(
                token,
                &DecodingKey::from_secret(secret.as_bytes()),
                &Validation::default(),
            ) {
                Ok(data) => return Ok(data.claims),
                Err(e) => {
                    if matches!(
                        e.kind(),
                        jsonwebtoken::errors::ErrorKind::ExpiredSignature
                    ) {
                        expired = true;
                    }
                }
            }
        }
        let msg = if expired { "Token expired" } else { "Invalid token" };
        Err(ApiError::Unauthorized(msg.to_string()))
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();

    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::Validation(
            "Username must be between 3 and 32 characters".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(ApiError::Validation("A valid email is required".to_string()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let description = req
        .description
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    // Hash with Argon2id before entering the blocking section.
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow!("password hashing failed: {}", e)))?
        .to_string();

    let db = state.clone();
    let user = blocking(move || {
        if db.db.get_user_by_username(&username)?.is_some() {
            return Err(ApiError::Validation("Username already taken".to_string()));
        }
        if db.db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::Validation("Email already registered".to_string()));
        }
        match db
            .db
            .create_user(&username, &email, &password_hash, description.as_deref())
        {
            Ok(row) => Ok(row),
            // Lost a race with a concurrent registration.
            Err(e) if is_constraint_violation(&e) => {
                Err(ApiError::Validation("Username or email already taken".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user_view(user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let email = req.email.trim().to_string();

    let db = state.clone();
    let user = blocking(move || db.db.get_user_by_email(&email).map_err(ApiError::from))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(anyhow!("stored password hash unreadable: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    let token = create_token(&state.auth, user.id, &user.email)?;

    Ok(Json(LoginResponse {
        token,
        user: user_view(user),
    }))
}

pub(crate) fn create_token(keys: &AuthKeys, user_id: i64, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(keys.signing_secret().as_bytes()),
    )?;

    Ok(token)
}
