//! Authentication API endpoints
//!
//! - POST /api/user/register - Register a buyer or seller
//! - POST /api/login - Open a session, returns access and refresh tokens
//! - POST /api/refresh-token - New access token for a refresh token
//! - POST /api/logout-all - Re-authenticate and revoke every session
//! - POST /api/secured/logout - Revoke the caller's session
//! - GET /api/ping, GET /api/secured/ping - Liveness checks

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateUserInput, User, UserRole};
use crate::services::TokenPair;

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub role: UserRole,
}

/// Request body carrying credentials (login and logout-all)
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

/// Request body for refreshing an access token
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(alias = "rt")]
    pub refresh_token: String,
}

/// Response for a refreshed access token
#[derive(Debug, Serialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
}

/// Response for user info
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Response for ping endpoints
#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub message: &'static str,
}

/// Response for logout-all
#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub revoked_sessions: u64,
}

/// GET /api/ping - Also checks the database connection
pub async fn ping(State(state): State<AppState>) -> Result<Json<PingResponse>, ApiError> {
    state.pool.ping().await.map_err(|e| {
        tracing::error!("Database ping failed: {:#}", e);
        ApiError::internal_error("Database unavailable")
    })?;
    Ok(Json(PingResponse { message: "pong" }))
}

/// GET /api/secured/ping - Same as ping, but requires a valid access token
pub async fn secured_ping(Extension(_user): Extension<AuthenticatedUser>) -> Json<PingResponse> {
    Json(PingResponse { message: "pong" })
}

/// POST /api/user/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .user_service
        .register(CreateUserInput {
            username: body.username,
            password: body.password,
            role: body.role,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = state.user_service.login(&body.username, &body.password).await?;
    Ok(Json(pair))
}

/// POST /api/refresh-token
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let access_token = state.user_service.refresh(&body.refresh_token).await?;
    Ok(Json(AccessTokenResponse { access_token }))
}

/// POST /api/secured/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<StatusCode, ApiError> {
    state.user_service.logout(&user.0).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/logout-all
pub async fn logout_all(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<LogoutAllResponse>, ApiError> {
    let revoked_sessions = state
        .user_service
        .logout_all(&body.username, &body.password)
        .await?;
    Ok(Json(LogoutAllResponse { revoked_sessions }))
}
