//! Product repository
//!
//! Database operations for products. Writes that change a listing are scoped
//! to the owning seller: the `*_owned` operations filter on both the product
//! ID and the seller ID and report how many rows they touched.

use super::{parse_uuid, to_count};
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Product;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Product repository trait
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Create a new product
    async fn create(&self, product: &Product) -> Result<Product>;

    /// Get product by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Product>>;

    /// Get product by its unique name
    async fn get_by_name(&self, name: &str) -> Result<Option<Product>>;

    /// List all products ordered by name
    async fn list(&self) -> Result<Vec<Product>>;

    /// Replace name, price and stock of a product owned by `product.seller_id`.
    /// Returns rows affected.
    async fn update_owned(&self, product: &Product) -> Result<u64>;

    /// Delete a product owned by `seller_id`. Returns rows affected.
    async fn delete_owned(&self, id: Uuid, seller_id: Uuid) -> Result<u64>;
}

/// SQLx-based product repository implementation
pub struct SqlxProductRepository {
    pool: DynDatabasePool,
}

impl SqlxProductRepository {
    /// Create a new SQLx product repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ProductRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ProductRepository for SqlxProductRepository {
    async fn create(&self, product: &Product) -> Result<Product> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_product_sqlite(self.pool.sqlite()?, product).await,
            DatabaseDriver::Mysql => create_product_mysql(self.pool.mysql()?, product).await,
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Product>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_product_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_product_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Product>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_product_by_name_sqlite(self.pool.sqlite()?, name).await,
            DatabaseDriver::Mysql => get_product_by_name_mysql(self.pool.mysql()?, name).await,
        }
    }

    async fn list(&self) -> Result<Vec<Product>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_products_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_products_mysql(self.pool.mysql()?).await,
        }
    }

    async fn update_owned(&self, product: &Product) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_product_sqlite(self.pool.sqlite()?, product).await,
            DatabaseDriver::Mysql => update_product_mysql(self.pool.mysql()?, product).await,
        }
    }

    async fn delete_owned(&self, id: Uuid, seller_id: Uuid) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_product_sqlite(self.pool.sqlite()?, id, seller_id).await
            }
            DatabaseDriver::Mysql => delete_product_mysql(self.pool.mysql()?, id, seller_id).await,
        }
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, name, price, available, seller_id, created_at, updated_at FROM products";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_product_sqlite(pool: &SqlitePool, product: &Product) -> Result<Product> {
    sqlx::query(
        r#"
        INSERT INTO products (id, name, price, available, seller_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(product.id.to_string())
    .bind(&product.name)
    .bind(i64::from(product.price))
    .bind(i64::from(product.available))
    .bind(product.seller_id.to_string())
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(pool)
    .await
    .context("Failed to create product")?;

    Ok(product.clone())
}

async fn get_product_by_id_sqlite(pool: &SqlitePool, id: Uuid) -> Result<Option<Product>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get product by ID")?;

    row.map(|row| row_to_product_sqlite(&row)).transpose()
}

async fn get_product_by_name_sqlite(pool: &SqlitePool, name: &str) -> Result<Option<Product>> {
    let row = sqlx::query(&format!("{} WHERE name = ?", SELECT_COLUMNS))
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get product by name")?;

    row.map(|row| row_to_product_sqlite(&row)).transpose()
}

async fn list_products_sqlite(pool: &SqlitePool) -> Result<Vec<Product>> {
    let rows = sqlx::query(&format!("{} ORDER BY name ASC", SELECT_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list products")?;

    rows.iter().map(row_to_product_sqlite).collect()
}

async fn update_product_sqlite(pool: &SqlitePool, product: &Product) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE products
        SET name = ?, price = ?, available = ?, updated_at = ?
        WHERE id = ? AND seller_id = ?
        "#,
    )
    .bind(&product.name)
    .bind(i64::from(product.price))
    .bind(i64::from(product.available))
    .bind(Utc::now())
    .bind(product.id.to_string())
    .bind(product.seller_id.to_string())
    .execute(pool)
    .await
    .context("Failed to update product")?;

    Ok(result.rows_affected())
}

async fn delete_product_sqlite(pool: &SqlitePool, id: Uuid, seller_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM products WHERE id = ? AND seller_id = ?")
        .bind(id.to_string())
        .bind(seller_id.to_string())
        .execute(pool)
        .await
        .context("Failed to delete product")?;

    Ok(result.rows_affected())
}

fn row_to_product_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Product> {
    let id: String = row.get("id");
    let seller_id: String = row.get("seller_id");

    Ok(Product {
        id: parse_uuid(&id)?,
        name: row.get("name"),
        price: to_count(row.get("price"), "price")?,
        available: to_count(row.get("available"), "available")?,
        seller_id: parse_uuid(&seller_id)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_product_mysql(pool: &MySqlPool, product: &Product) -> Result<Product> {
    sqlx::query(
        r#"
        INSERT INTO products (id, name, price, available, seller_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(product.id.to_string())
    .bind(&product.name)
    .bind(i64::from(product.price))
    .bind(i64::from(product.available))
    .bind(product.seller_id.to_string())
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(pool)
    .await
    .context("Failed to create product")?;

    Ok(product.clone())
}

async fn get_product_by_id_mysql(pool: &MySqlPool, id: Uuid) -> Result<Option<Product>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get product by ID")?;

    row.map(|row| row_to_product_mysql(&row)).transpose()
}

async fn get_product_by_name_mysql(pool: &MySqlPool, name: &str) -> Result<Option<Product>> {
    let row = sqlx::query(&format!("{} WHERE name = ?", SELECT_COLUMNS))
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get product by name")?;

    row.map(|row| row_to_product_mysql(&row)).transpose()
}

async fn list_products_mysql(pool: &MySqlPool) -> Result<Vec<Product>> {
    let rows = sqlx::query(&format!("{} ORDER BY name ASC", SELECT_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list products")?;

    rows.iter().map(row_to_product_mysql).collect()
}

async fn update_product_mysql(pool: &MySqlPool, product: &Product) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE products
        SET name = ?, price = ?, available = ?, updated_at = ?
        WHERE id = ? AND seller_id = ?
        "#,
    )
    .bind(&product.name)
    .bind(i64::from(product.price))
    .bind(i64::from(product.available))
    .bind(Utc::now())
    .bind(product.id.to_string())
    .bind(product.seller_id.to_string())
    .execute(pool)
    .await
    .context("Failed to update product")?;

    Ok(result.rows_affected())
}

async fn delete_product_mysql(pool: &MySqlPool, id: Uuid, seller_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM products WHERE id = ? AND seller_id = ?")
        .bind(id.to_string())
        .bind(seller_id.to_string())
        .execute(pool)
        .await
        .context("Failed to delete product")?;

    Ok(result.rows_affected())
}

fn row_to_product_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Product> {
    let id: String = row.get("id");
    let seller_id: String = row.get("seller_id");

    Ok(Product {
        id: parse_uuid(&id)?,
        name: row.get("name"),
        price: to_count(row.get("price"), "price")?,
        available: to_count(row.get("available"), "available")?,
        seller_id: parse_uuid(&seller_id)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
