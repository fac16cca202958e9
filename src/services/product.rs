//! Product service
//!
//! Seller-side listing management. Anyone may list products; only the
//! owning seller may change or remove one.

use crate::db::repositories::{is_unique_violation, ProductRepository};
use crate::models::{CreateProductInput, Product, UpdateProductInput};
use anyhow::Context;
use std::sync::Arc;
use uuid::Uuid;

const NAME_MIN_LEN: usize = 2;
const NAME_MAX_LEN: usize = 30;
const MAX_PRICE: u32 = 1000;
const MAX_AVAILABLE: u32 = 99;

/// Error types for product operations
#[derive(Debug, thiserror::Error)]
pub enum ProductServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Product not found")]
    NotFound,

    #[error("Product name '{0}' is already taken")]
    Conflict(String),

    #[error("you don't have permission to modify this product")]
    Forbidden,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Product service
pub struct ProductService {
    repo: Arc<dyn ProductRepository>,
}

impl ProductService {
    pub fn new(repo: Arc<dyn ProductRepository>) -> Self {
        Self { repo }
    }

    /// List all products
    pub async fn list(&self) -> Result<Vec<Product>, ProductServiceError> {
        Ok(self.repo.list().await.context("Failed to list products")?)
    }

    /// Get a product by ID
    pub async fn get(&self, id: Uuid) -> Result<Product, ProductServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to load product")?
            .ok_or(ProductServiceError::NotFound)
    }

    /// Create a product owned by `seller_id`
    pub async fn create(
        &self,
        seller_id: Uuid,
        input: CreateProductInput,
    ) -> Result<Product, ProductServiceError> {
        let name = input.name.trim().to_string();
        validate_listing(&name, input.price, input.available)?;
        self.ensure_name_free(&name, None).await?;

        let product = Product::new(name, input.price, input.available, seller_id);
        let created = self
            .repo
            .create(&product)
            .await
            .map_err(|e| write_error(e, &product.name))?;

        tracing::info!("Seller {} listed {}", seller_id, created.name);
        Ok(created)
    }

    /// Replace a product's listing. Only the owner may do this.
    ///
    /// A product that does not exist is reported as `Forbidden`, the same as
    /// one owned by someone else.
    pub async fn update(
        &self,
        seller_id: Uuid,
        id: Uuid,
        input: UpdateProductInput,
    ) -> Result<Product, ProductServiceError> {
        let name = input.name.trim().to_string();
        validate_listing(&name, input.price, input.available)?;
        self.ensure_name_free(&name, Some(id)).await?;

        let mut product = Product::new(name, input.price, input.available, seller_id);
        product.id = id;

        let affected = self
            .repo
            .update_owned(&product)
            .await
            .map_err(|e| write_error(e, &product.name))?;
        if affected == 0 {
            tracing::warn!("Seller {} may not update product {}", seller_id, id);
            return Err(ProductServiceError::Forbidden);
        }

        tracing::info!("Seller {} updated product {}", seller_id, id);
        self.get(id).await
    }

    /// Delete a product. Only the owner may do this.
    pub async fn delete(&self, seller_id: Uuid, id: Uuid) -> Result<(), ProductServiceError> {
        let affected = self
            .repo
            .delete_owned(id, seller_id)
            .await
            .context("Failed to delete product")?;
        if affected == 0 {
            tracing::warn!("Seller {} may not delete product {}", seller_id, id);
            return Err(ProductServiceError::Forbidden);
        }

        tracing::info!("Seller {} deleted product {}", seller_id, id);
        Ok(())
    }

    async fn ensure_name_free(&self, name: &str, own_id: Option<Uuid>) -> Result<(), ProductServiceError> {
        let existing = self
            .repo
            .get_by_name(name)
            .await
            .context("Failed to check product name")?;

        match existing {
            Some(product) if Some(product.id) != own_id => {
                Err(ProductServiceError::Conflict(name.to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// A concurrent writer can take the name between the check and the write;
/// the UNIQUE constraint then rejects ours.
fn write_error(error: anyhow::Error, name: &str) -> ProductServiceError {
    if is_unique_violation(&error) {
        ProductServiceError::Conflict(name.to_string())
    } else {
        ProductServiceError::InternalError(error)
    }
}

fn validate_listing(name: &str, price: u32, available: u32) -> Result<(), ProductServiceError> {
    let len = name.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(ProductServiceError::ValidationError(format!(
            "Name must be between {} and {} characters",
            NAME_MIN_LEN, NAME_MAX_LEN
        )));
    }
    if price > MAX_PRICE || price % 5 != 0 {
        return Err(ProductServiceError::ValidationError(format!(
            "Price must be a multiple of 5 no greater than {}",
            MAX_PRICE
        )));
    }
    if available > MAX_AVAILABLE {
        return Err(ProductServiceError::ValidationError(format!(
            "Available must be at most {}",
            MAX_AVAILABLE
        )));
    }
    Ok(())
}
