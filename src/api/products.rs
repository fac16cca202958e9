//! Product API endpoints
//!
//! - GET /api/products - Public product list
//! - PUT /api/secured/product - Create a product (seller)
//! - POST /api/secured/product - Update an owned product (seller)
//! - DELETE /api/secured/product - Delete an owned product (seller)

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateProductInput, Product, UpdateProductInput};

/// Request body for updating a product
#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub id: Uuid,
    #[serde(flatten)]
    pub listing: UpdateProductInput,
}

/// Request body for deleting a product
#[derive(Debug, Deserialize)]
pub struct DeleteProductRequest {
    pub id: Uuid,
}

/// Response naming the affected product
#[derive(Debug, Serialize)]
pub struct ProductIdResponse {
    pub product_id: Uuid,
}

/// GET /api/products
pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    let products = state.product_service.list().await?;
    Ok(Json(products))
}

/// PUT /api/secured/product
pub async fn create_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state.product_service.create(user.0.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// POST /api/secured/product
pub async fn update_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let product = state
        .product_service
        .update(user.0.user_id, body.id, body.listing)
        .await?;
    Ok(Json(product))
}

/// DELETE /api/secured/product
pub async fn delete_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<DeleteProductRequest>,
) -> Result<Json<ProductIdResponse>, ApiError> {
    state.product_service.delete(user.0.user_id, body.id).await?;
    Ok(Json(ProductIdResponse { product_id: body.id }))
}
