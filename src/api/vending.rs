//! Buyer API endpoints
//!
//! - POST /api/secured/deposit - Insert one coin
//! - POST /api/secured/reset-deposit - Zero the coin ledger
//! - POST /api/secured/buy - Buy units of a product
//! - GET /api/secured/balance - Current coin ledger

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Balance, CoinLedger};
use crate::services::PurchaseReceipt;

/// Request body for a deposit
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    /// Face value of the inserted coin
    pub amount: u32,
}

/// Request body for a purchase
#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    pub product_id: Uuid,
    /// Units to buy
    pub amount: u32,
}

/// Coin ledger view
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub coins: CoinLedger,
    pub total: u64,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            total: balance.coins.total(),
            coins: balance.coins,
        }
    }
}

/// POST /api/secured/deposit
pub async fn deposit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<DepositRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state
        .vending_service
        .deposit(user.0.user_id, body.amount)
        .await?;
    Ok(Json(balance.into()))
}

/// POST /api/secured/reset-deposit
pub async fn reset_deposit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<StatusCode, ApiError> {
    state.vending_service.reset_deposit(user.0.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/secured/buy
pub async fn buy(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<BuyRequest>,
) -> Result<Json<PurchaseReceipt>, ApiError> {
    let receipt = state
        .vending_service
        .buy(user.0.user_id, body.product_id, body.amount)
        .await?;
    Ok(Json(receipt))
}

/// GET /api/secured/balance
pub async fn balance(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.vending_service.get_balance(user.0.user_id).await?;
    Ok(Json(balance.into()))
}
