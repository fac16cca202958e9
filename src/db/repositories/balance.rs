//! Balance repository
//!
//! Per-buyer coin counters. Deposits are single-statement increments so
//! concurrent deposits never lose a coin.

use super::{parse_uuid, to_count};
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Balance, Coin, CoinLedger};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Balance repository trait
#[async_trait]
pub trait BalanceRepository: Send + Sync {
    /// Create the balance row for a user
    async fn create(&self, balance: &Balance) -> Result<Balance>;

    /// Get a user's balance
    async fn get_by_user(&self, user_id: Uuid) -> Result<Option<Balance>>;

    /// Add one coin of the given denomination. Returns rows affected.
    async fn deposit(&self, user_id: Uuid, coin: Coin) -> Result<u64>;

    /// Zero every counter. Returns rows affected.
    async fn reset(&self, user_id: Uuid) -> Result<u64>;
}

/// SQLx-based balance repository implementation
pub struct SqlxBalanceRepository {
    pool: DynDatabasePool,
}

impl SqlxBalanceRepository {
    /// Create a new SQLx balance repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BalanceRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BalanceRepository for SqlxBalanceRepository {
    async fn create(&self, balance: &Balance) -> Result<Balance> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_balance_sqlite(self.pool.sqlite()?, balance).await,
            DatabaseDriver::Mysql => create_balance_mysql(self.pool.mysql()?, balance).await,
        }
    }

    async fn get_by_user(&self, user_id: Uuid) -> Result<Option<Balance>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_balance_sqlite(self.pool.sqlite()?, user_id).await,
            DatabaseDriver::Mysql => get_balance_mysql(self.pool.mysql()?, user_id).await,
        }
    }

    async fn deposit(&self, user_id: Uuid, coin: Coin) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => deposit_sqlite(self.pool.sqlite()?, user_id, coin).await,
            DatabaseDriver::Mysql => deposit_mysql(self.pool.mysql()?, user_id, coin).await,
        }
    }

    async fn reset(&self, user_id: Uuid) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => reset_balance_sqlite(self.pool.sqlite()?, user_id).await,
            DatabaseDriver::Mysql => reset_balance_mysql(self.pool.mysql()?, user_id).await,
        }
    }
}

/// Column holding the counter for a denomination
pub(crate) fn coin_column(coin: Coin) -> &'static str {
    match coin {
        Coin::Five => "five",
        Coin::Ten => "ten",
        Coin::Twenty => "twenty",
        Coin::Fifty => "fifty",
        Coin::Hundred => "hundred",
    }
}

const RESET_SQL: &str = r#"
    UPDATE balances
    SET five = 0, ten = 0, twenty = 0, fifty = 0, hundred = 0
    WHERE user_id = ?
"#;

fn deposit_sql(coin: Coin) -> String {
    let column = coin_column(coin);
    format!(
        "UPDATE balances SET {column} = {column} + 1 WHERE user_id = ?",
        column = column
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_balance_sqlite(pool: &SqlitePool, balance: &Balance) -> Result<Balance> {
    let coins = &balance.coins;
    sqlx::query(
        r#"
        INSERT INTO balances (user_id, five, ten, twenty, fifty, hundred)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(balance.user_id.to_string())
    .bind(i64::from(coins.five))
    .bind(i64::from(coins.ten))
    .bind(i64::from(coins.twenty))
    .bind(i64::from(coins.fifty))
    .bind(i64::from(coins.hundred))
    .execute(pool)
    .await
    .context("Failed to create balance")?;

    Ok(balance.clone())
}

async fn get_balance_sqlite(pool: &SqlitePool, user_id: Uuid) -> Result<Option<Balance>> {
    let row = sqlx::query(
        r#"
        SELECT user_id, five, ten, twenty, fifty, hundred
        FROM balances
        WHERE user_id = ?
        "#,
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await
    .context("Failed to get balance")?;

    row.map(|row| row_to_balance_sqlite(&row)).transpose()
}

async fn deposit_sqlite(pool: &SqlitePool, user_id: Uuid, coin: Coin) -> Result<u64> {
    let result = sqlx::query(&deposit_sql(coin))
        .bind(user_id.to_string())
        .execute(pool)
        .await
        .with_context(|| format!("Failed to deposit coin {}", coin))?;

    Ok(result.rows_affected())
}

async fn reset_balance_sqlite(pool: &SqlitePool, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query(RESET_SQL)
        .bind(user_id.to_string())
        .execute(pool)
        .await
        .context("Failed to reset balance")?;

    Ok(result.rows_affected())
}

fn row_to_balance_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Balance> {
    let user_id: String = row.get("user_id");
    Ok(Balance {
        user_id: parse_uuid(&user_id)?,
        coins: CoinLedger {
            five: to_count(row.get("five"), "five")?,
            ten: to_count(row.get("ten"), "ten")?,
            twenty: to_count(row.get("twenty"), "twenty")?,
            fifty: to_count(row.get("fifty"), "fifty")?,
            hundred: to_count(row.get("hundred"), "hundred")?,
        },
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_balance_mysql(pool: &MySqlPool, balance: &Balance) -> Result<Balance> {
    let coins = &balance.coins;
    sqlx::query(
        r#"
        INSERT INTO balances (user_id, five, ten, twenty, fifty, hundred)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(balance.user_id.to_string())
    .bind(i64::from(coins.five))
    .bind(i64::from(coins.ten))
    .bind(i64::from(coins.twenty))
    .bind(i64::from(coins.fifty))
    .bind(i64::from(coins.hundred))
    .execute(pool)
    .await
    .context("Failed to create balance")?;

    Ok(balance.clone())
}

async fn get_balance_mysql(pool: &MySqlPool, user_id: Uuid) -> Result<Option<Balance>> {
    let row = sqlx::query(
        r#"
        SELECT user_id, five, ten, twenty, fifty, hundred
        FROM balances
        WHERE user_id = ?
        "#,
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await
    .context("Failed to get balance")?;

    row.map(|row| row_to_balance_mysql(&row)).transpose()
}

async fn deposit_mysql(pool: &MySqlPool, user_id: Uuid, coin: Coin) -> Result<u64> {
    let result = sqlx::query(&deposit_sql(coin))
        .bind(user_id.to_string())
        .execute(pool)
        .await
        .with_context(|| format!("Failed to deposit coin {}", coin))?;

    Ok(result.rows_affected())
}

async fn reset_balance_mysql(pool: &MySqlPool, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query(RESET_SQL)
        .bind(user_id.to_string())
        .execute(pool)
        .await
        .context("Failed to reset balance")?;

    Ok(result.rows_affected())
}

fn row_to_balance_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Balance> {
    let user_id: String = row.get("user_id");
    Ok(Balance {
        user_id: parse_uuid(&user_id)?,
        coins: CoinLedger {
            five: to_count(row.get("five"), "five")?,
            ten: to_count(row.get("ten"), "ten")?,
            twenty: to_count(row.get("twenty"), "twenty")?,
            fifty: to_count(row.get("fifty"), "fifty")?,
            hundred: to_count(row.get("hundred"), "hundred")?,
        },
    })
}
