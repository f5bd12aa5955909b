pub mod policy;

use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::shared::enums::UserRole;
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::models::{AuthSession, User};
use crate::shared::schema::{auth_sessions, users};
use crate::shared::state::AppState;

const SESSION_TTL_DAYS: i64 = 14;

/// Authenticated requester, resolved from the bearer session token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn role(&self) -> UserRole {
        self.0.role
    }

    pub fn is_agent_or_admin(&self) -> bool {
        matches!(self.0.role, UserRole::Agent | UserRole::Admin)
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let session_id: Uuid = token.parse().map_err(|_| ApiError::Unauthorized)?;

        let mut conn = state.conn.get()?;
        let session: AuthSession = auth_sessions::table
            .filter(auth_sessions::id.eq(session_id))
            .first(&mut conn)
            .optional()?
            .ok_or(ApiError::Unauthorized)?;
        if session.expires_at < Utc::now() {
            return Err(ApiError::Unauthorized);
        }

        let user: User = users::table
            .filter(users::id.eq(session.user_id))
            .first(&mut conn)
            .optional()?
            .ok_or(ApiError::Unauthorized)?;
        if !user.is_active {
            return Err(ApiError::Unauthorized);
        }

        Ok(AuthenticatedUser(user))
    }
}

fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?;
    let value = value.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
    pub phone: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: Uuid,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub email_notifications: Option<bool>,
    pub sms_notifications: Option<bool>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<User>> {
    if req.username.trim().is_empty() {
        return Err(ApiError::Validation("Username is required".into()));
    }
    if req.email.trim().is_empty() {
        return Err(ApiError::Validation("Email is required".into()));
    }
    if req.password.is_empty() {
        return Err(ApiError::Validation("Password is required".into()));
    }
    if req.password != req.password_confirm {
        return Err(ApiError::Validation("Passwords don't match.".into()));
    }

    let mut conn = state.conn.get()?;

    let taken: i64 = users::table
        .filter(
            users::username
                .eq(&req.username)
                .or(users::email.eq(&req.email)),
        )
        .count()
        .get_result(&mut conn)?;
    if taken > 0 {
        return Err(ApiError::Validation(
            "Username or email already in use".into(),
        ));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        username: req.username,
        email: req.email,
        password_hash: hash_password(&req.password)?,
        first_name: req.first_name.unwrap_or_default(),
        last_name: req.last_name.unwrap_or_default(),
        role: req.role.unwrap_or_default(),
        phone: req.phone,
        department: req.department,
        is_active: true,
        email_notifications: true,
        sms_notifications: false,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)?;

    info!(username = %user.username, role = %user.role, "user registered");
    Ok(Json(user))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let mut conn = state.conn.get()?;

    let user: Option<User> = users::table
        .filter(users::username.eq(&req.username))
        .first(&mut conn)
        .optional()?;

    let user = match user {
        Some(u) if verify_password(&req.password, &u.password_hash) => u,
        _ => return Err(ApiError::Validation("Invalid credentials.".into())),
    };
    if !user.is_active {
        return Err(ApiError::Validation("User account is disabled.".into()));
    }

    let now = Utc::now();
    let session = AuthSession {
        id: Uuid::new_v4(),
        user_id: user.id,
        created_at: now,
        expires_at: now + Duration::days(SESSION_TTL_DAYS),
    };
    diesel::insert_into(auth_sessions::table)
        .values(&session)
        .execute(&mut conn)?;

    info!(username = %user.username, "login");
    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        token: session.id,
        user,
    }))
}

/// Revokes the presented session only; other devices stay signed in.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    headers: axum::http::HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    let session_id: Uuid = token.parse().map_err(|_| ApiError::Unauthorized)?;

    let mut conn = state.conn.get()?;
    diesel::delete(
        auth_sessions::table
            .filter(auth_sessions::id.eq(session_id))
            .filter(auth_sessions::user_id.eq(user.id())),
    )
    .execute(&mut conn)?;
    Ok(Json(json!({ "message": "Logout successful" })))
}

pub async fn get_profile(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let mut conn = state.conn.get()?;
    let mut updated = user.0;

    if let Some(email) = req.email {
        if email.trim().is_empty() {
            return Err(ApiError::Validation("Email cannot be empty".into()));
        }
        if email != updated.email {
            let taken: i64 = users::table
                .filter(users::email.eq(&email))
                .filter(users::id.ne(updated.id))
                .count()
                .get_result(&mut conn)?;
            if taken > 0 {
                return Err(ApiError::Validation("Email already in use".into()));
            }
        }
        updated.email = email;
    }
    if let Some(first_name) = req.first_name {
        updated.first_name = first_name;
    }
    if let Some(last_name) = req.last_name {
        updated.last_name = last_name;
    }
    if let Some(phone) = req.phone {
        updated.phone = Some(phone);
    }
    if let Some(department) = req.department {
        updated.department = Some(department);
    }
    if let Some(email_notifications) = req.email_notifications {
        updated.email_notifications = email_notifications;
    }
    if let Some(sms_notifications) = req.sms_notifications {
        updated.sms_notifications = sms_notifications;
    }
    updated.updated_at = Utc::now();

    diesel::update(users::table.filter(users::id.eq(updated.id)))
        .set(&updated)
        .execute(&mut conn)?;

    Ok(Json(updated))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/profile", get(get_profile).put(update_profile))
}
