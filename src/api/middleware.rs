//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error type and its mapping from service errors
//! - Authentication (Bearer access token validation)
//! - Role guards for buyer-only and seller-only routes

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::db::repositories::{
    SqlxBalanceRepository, SqlxProductRepository, SqlxPurchaseRepository, SqlxSessionRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::UserRole;
use crate::services::{
    AccessClaims, AuthError, KeyResolver, ProductService, ProductServiceError, TokenService,
    UserService, UserServiceError, VendingError, VendingService,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub token_service: Arc<TokenService>,
    pub user_service: Arc<UserService>,
    pub vending_service: Arc<VendingService>,
    pub product_service: Arc<ProductService>,
}

impl AppState {
    /// Wire repositories and services on top of a migrated pool
    pub fn from_pool(pool: DynDatabasePool, auth: &AuthConfig, key: KeyResolver) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let balance_repo = SqlxBalanceRepository::boxed(pool.clone());
        let product_repo = SqlxProductRepository::boxed(pool.clone());
        let purchase_repo = SqlxPurchaseRepository::boxed(pool.clone());

        let token_service = Arc::new(TokenService::new(session_repo.clone(), key, auth));
        let user_service = Arc::new(UserService::new(
            user_repo.clone(),
            session_repo,
            balance_repo.clone(),
            token_service.clone(),
            auth.session_reuse_window(),
        ));
        let vending_service = Arc::new(VendingService::new(
            user_repo,
            balance_repo,
            product_repo.clone(),
            purchase_repo,
        ));
        let product_service = Arc::new(ProductService::new(product_repo));

        Self {
            pool,
            token_service,
            user_service,
            vending_service,
            product_service,
        }
    }
}

/// Validated access-token claims of the caller
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AccessClaims);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    fn internal(error: &anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", error);
        Self::internal_error("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "INSUFFICIENT_FUNDS" | "INSUFFICIENT_INVENTORY" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Expired
            | AuthError::InvalidSignature
            | AuthError::MalformedToken
            | AuthError::SessionInvalid => ApiError::unauthorized(err.to_string()),
            AuthError::SessionAlreadyExists => ApiError::forbidden(err.to_string()),
            AuthError::Signing(msg) => {
                tracing::error!("Token signing failed: {}", msg);
                ApiError::internal_error("Internal server error")
            }
            AuthError::Persistence(e) => ApiError::internal(&e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::InvalidCredentials => ApiError::unauthorized(err.to_string()),
            UserServiceError::NotFound => ApiError::not_found(err.to_string()),
            UserServiceError::Auth(auth) => auth.into(),
            UserServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<VendingError> for ApiError {
    fn from(err: VendingError) -> Self {
        match err {
            VendingError::ValidationError(msg) => ApiError::validation_error(msg),
            VendingError::NotFound(_) => ApiError::not_found(err.to_string()),
            VendingError::InsufficientFunds { cost, deposited } => ApiError::with_details(
                "INSUFFICIENT_FUNDS",
                err.to_string(),
                serde_json::json!({ "cost": cost, "deposited": deposited }),
            ),
            VendingError::InsufficientInventory {
                requested,
                available,
            } => ApiError::with_details(
                "INSUFFICIENT_INVENTORY",
                err.to_string(),
                serde_json::json!({ "requested": requested, "available": available }),
            ),
            VendingError::Conflict => ApiError::conflict(err.to_string()),
            VendingError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<ProductServiceError> for ApiError {
    fn from(err: ProductServiceError) -> Self {
        match err {
            ProductServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ProductServiceError::NotFound => ApiError::not_found(err.to_string()),
            ProductServiceError::Conflict(_) => ApiError::conflict(err.to_string()),
            ProductServiceError::Forbidden => ApiError::forbidden(err.to_string()),
            ProductServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

/// Extract a Bearer token from the Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware
///
/// Validates the access token (signature, expiry and backing session) and
/// stores the claims as [`AuthenticatedUser`] for downstream handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let claims = state.token_service.validate_access_token(token).await?;

    request.extensions_mut().insert(AuthenticatedUser(claims));
    Ok(next.run(request).await)
}

/// Buyer authorization middleware
pub async fn require_buyer(request: Request, next: Next) -> Result<Response, ApiError> {
    match caller_role(&request)? {
        UserRole::Buyer => Ok(next.run(request).await),
        UserRole::Seller => Err(ApiError::forbidden("Only buyers can access this resource")),
    }
}

/// Seller authorization middleware
pub async fn require_seller(request: Request, next: Next) -> Result<Response, ApiError> {
    match caller_role(&request)? {
        UserRole::Seller => Ok(next.run(request).await),
        UserRole::Buyer => Err(ApiError::forbidden("Only sellers can access this resource")),
    }
}

fn caller_role(request: &Request) -> Result<UserRole, ApiError> {
    request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.0.role)
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))
}
