//! Purchase repository
//!
//! Applies a purchase as one transaction: the product stock is decremented
//! and the buyer's ledger replaced by the change. Both updates are guarded by
//! the values the caller read earlier, so a concurrent deposit, purchase or
//! restock makes the commit report [`CommitOutcome::Conflict`] instead of
//! overwriting the other write.

use super::to_count;
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::CoinLedger;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlConnection, MySqlPool, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Everything needed to apply a purchase
#[derive(Debug, Clone)]
pub struct PurchaseCommit {
    pub user_id: Uuid,
    pub product_id: Uuid,
    /// Units bought
    pub quantity: u32,
    /// Stock observed when the purchase was priced
    pub expected_available: u32,
    /// Ledger observed when the purchase was priced
    pub expected_coins: CoinLedger,
    /// Ledger after the purchase (the change handed back)
    pub new_coins: CoinLedger,
}

/// Result of [`PurchaseRepository::commit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Both rows were updated
    Applied,
    /// Stock or ledger changed since they were read; nothing was written
    Conflict,
}

/// Purchase repository trait
#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    /// Atomically apply a purchase
    async fn commit(&self, purchase: &PurchaseCommit) -> Result<CommitOutcome>;
}

/// SQLx-based purchase repository implementation
pub struct SqlxPurchaseRepository {
    pool: DynDatabasePool,
}

impl SqlxPurchaseRepository {
    /// Create a new SQLx purchase repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PurchaseRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PurchaseRepository for SqlxPurchaseRepository {
    async fn commit(&self, purchase: &PurchaseCommit) -> Result<CommitOutcome> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => commit_purchase_sqlite(self.pool.sqlite()?, purchase).await,
            DatabaseDriver::Mysql => commit_purchase_mysql(self.pool.mysql()?, purchase).await,
        }
    }
}

const DECREMENT_STOCK_SQL: &str = r#"
    UPDATE products
    SET available = available - ?, updated_at = ?
    WHERE id = ? AND available = ?
"#;

const REPLACE_LEDGER_SQL: &str = r#"
    UPDATE balances
    SET five = ?, ten = ?, twenty = ?, fifty = ?, hundred = ?
    WHERE user_id = ?
      AND five = ? AND ten = ? AND twenty = ? AND fifty = ? AND hundred = ?
"#;

// ============================================================================
// SQLite implementation
// ============================================================================

async fn commit_purchase_sqlite(
    pool: &SqlitePool,
    purchase: &PurchaseCommit,
) -> Result<CommitOutcome> {
    let mut tx = pool.begin().await.context("Failed to begin purchase")?;

    let stock = sqlx::query(DECREMENT_STOCK_SQL)
        .bind(i64::from(purchase.quantity))
        .bind(chrono::Utc::now())
        .bind(purchase.product_id.to_string())
        .bind(i64::from(purchase.expected_available))
        .execute(&mut *tx)
        .await
        .context("Failed to decrement product stock")?;

    if stock.rows_affected() == 0 {
        tx.rollback().await.context("Failed to roll back purchase")?;
        return Ok(CommitOutcome::Conflict);
    }

    let new = &purchase.new_coins;
    let old = &purchase.expected_coins;
    let ledger = sqlx::query(REPLACE_LEDGER_SQL)
        .bind(i64::from(new.five))
        .bind(i64::from(new.ten))
        .bind(i64::from(new.twenty))
        .bind(i64::from(new.fifty))
        .bind(i64::from(new.hundred))
        .bind(purchase.user_id.to_string())
        .bind(i64::from(old.five))
        .bind(i64::from(old.ten))
        .bind(i64::from(old.twenty))
        .bind(i64::from(old.fifty))
        .bind(i64::from(old.hundred))
        .execute(&mut *tx)
        .await
        .context("Failed to update balance")?;

    if ledger.rows_affected() == 0 {
        tx.rollback().await.context("Failed to roll back purchase")?;
        return Ok(CommitOutcome::Conflict);
    }

    tx.commit().await.context("Failed to commit purchase")?;
    Ok(CommitOutcome::Applied)
}

// ============================================================================
// MySQL implementation
// ============================================================================

async fn commit_purchase_mysql(
    pool: &MySqlPool,
    purchase: &PurchaseCommit,
) -> Result<CommitOutcome> {
    let mut tx = pool.begin().await.context("Failed to begin purchase")?;

    let stock = sqlx::query(DECREMENT_STOCK_SQL)
        .bind(i64::from(purchase.quantity))
        .bind(chrono::Utc::now())
        .bind(purchase.product_id.to_string())
        .bind(i64::from(purchase.expected_available))
        .execute(&mut *tx)
        .await
        .context("Failed to decrement product stock")?;

    if stock.rows_affected() == 0 {
        tx.rollback().await.context("Failed to roll back purchase")?;
        return Ok(CommitOutcome::Conflict);
    }

    let new = &purchase.new_coins;
    let old = &purchase.expected_coins;
    let ledger = sqlx::query(REPLACE_LEDGER_SQL)
        .bind(i64::from(new.five))
        .bind(i64::from(new.ten))
        .bind(i64::from(new.twenty))
        .bind(i64::from(new.fifty))
        .bind(i64::from(new.hundred))
        .bind(purchase.user_id.to_string())
        .bind(i64::from(old.five))
        .bind(i64::from(old.ten))
        .bind(i64::from(old.twenty))
        .bind(i64::from(old.fifty))
        .bind(i64::from(old.hundred))
        .execute(&mut *tx)
        .await
        .context("Failed to update balance")?;

    if ledger.rows_affected() == 0
        && !ledger_matches_mysql(&mut *tx, purchase.user_id, old).await?
    {
        tx.rollback().await.context("Failed to roll back purchase")?;
        return Ok(CommitOutcome::Conflict);
    }

    tx.commit().await.context("Failed to commit purchase")?;
    Ok(CommitOutcome::Applied)
}

/// MySQL counts only rows whose values changed, so zero affected rows can
/// also mean the ledger matched and was rewritten with the same counts.
/// Re-read the row under lock to tell the two apart.
async fn ledger_matches_mysql(
    conn: &mut MySqlConnection,
    user_id: Uuid,
    expected: &CoinLedger,
) -> Result<bool> {
    let row = sqlx::query(
        r#"
        SELECT five, ten, twenty, fifty, hundred
        FROM balances
        WHERE user_id = ?
        FOR UPDATE
        "#,
    )
    .bind(user_id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to re-read balance")?;

    let Some(row) = row else {
        return Ok(false);
    };

    let stored = CoinLedger {
        five: to_count(row.get("five"), "five")?,
        ten: to_count(row.get("ten"), "ten")?,
        twenty: to_count(row.get("twenty"), "twenty")?,
        fifty: to_count(row.get("fifty"), "fifty")?,
        hundred: to_count(row.get("hundred"), "hundred")?,
    };
    Ok(&stored == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        BalanceRepository, ProductRepository, SqlxBalanceRepository, SqlxProductRepository,
        SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Balance, Coin, Product, User, UserRole};

    struct Fixture {
        purchases: SqlxPurchaseRepository,
        balances: SqlxBalanceRepository,
        products: SqlxProductRepository,
        buyer_id: Uuid,
        product_id: Uuid,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let seller = User::new("seller01".to_string(), "hash".to_string(), UserRole::Seller);
        let buyer = User::new("buyer01".to_string(), "hash".to_string(), UserRole::Buyer);
        users.create(&seller).await.expect("Failed to create seller");
        users.create(&buyer).await.expect("Failed to create buyer");

        let balances = SqlxBalanceRepository::new(pool.clone());
        balances
            .create(&Balance::empty(buyer.id))
            .await
            .expect("Failed to create balance");
        balances.deposit(buyer.id, Coin::Hundred).await.unwrap();

        let products = SqlxProductRepository::new(pool.clone());
        let product = Product::new("Cola".to_string(), 65, 3, seller.id);
        products.create(&product).await.expect("Failed to create product");

        Fixture {
            purchases: SqlxPurchaseRepository::new(pool),
            balances,
            products,
            buyer_id: buyer.id,
            product_id: product.id,
        }
    }

    fn ledger(hundred: u32, twenty: u32, ten: u32, five: u32) -> CoinLedger {
        CoinLedger {
            hundred,
            twenty,
            ten,
            five,
            ..CoinLedger::default()
        }
    }

    #[tokio::test]
    async fn test_commit_applies_both_updates() {
        let f = setup().await;
        let purchase = PurchaseCommit {
            user_id: f.buyer_id,
            product_id: f.product_id,
            quantity: 1,
            expected_available: 3,
            expected_coins: ledger(1, 0, 0, 0),
            new_coins: ledger(0, 1, 1, 1),
        };

        let outcome = f.purchases.commit(&purchase).await.expect("Commit failed");
        assert_eq!(outcome, CommitOutcome::Applied);

        let product = f.products.get_by_id(f.product_id).await.unwrap().unwrap();
        assert_eq!(product.available, 2);
        let balance = f.balances.get_by_user(f.buyer_id).await.unwrap().unwrap();
        assert_eq!(balance.coins, ledger(0, 1, 1, 1));
    }

    #[tokio::test]
    async fn test_stale_stock_is_conflict() {
        let f = setup().await;
        let purchase = PurchaseCommit {
            user_id: f.buyer_id,
            product_id: f.product_id,
            quantity: 1,
            expected_available: 5,
            expected_coins: ledger(1, 0, 0, 0),
            new_coins: ledger(0, 1, 1, 1),
        };

        let outcome = f.purchases.commit(&purchase).await.expect("Commit failed");
        assert_eq!(outcome, CommitOutcome::Conflict);

        let balance = f.balances.get_by_user(f.buyer_id).await.unwrap().unwrap();
        assert_eq!(balance.coins, ledger(1, 0, 0, 0));
    }

    #[tokio::test]
    async fn test_stale_ledger_rolls_back_stock() {
        let f = setup().await;
        // A deposit lands after the purchase was priced
        f.balances.deposit(f.buyer_id, Coin::Five).await.unwrap();

        let purchase = PurchaseCommit {
            user_id: f.buyer_id,
            product_id: f.product_id,
            quantity: 2,
            expected_available: 3,
            expected_coins: ledger(1, 0, 0, 0),
            new_coins: ledger(0, 0, 0, 0),
        };

        let outcome = f.purchases.commit(&purchase).await.expect("Commit failed");
        assert_eq!(outcome, CommitOutcome::Conflict);

        let product = f.products.get_by_id(f.product_id).await.unwrap().unwrap();
        assert_eq!(product.available, 3);
        let balance = f.balances.get_by_user(f.buyer_id).await.unwrap().unwrap();
        assert_eq!(balance.coins.total(), 105);
    }

    #[tokio::test]
    async fn test_free_product_keeps_ledger() {
        let f = setup().await;
        let purchase = PurchaseCommit {
            user_id: f.buyer_id,
            product_id: f.product_id,
            quantity: 1,
            expected_available: 3,
            expected_coins: ledger(1, 0, 0, 0),
            new_coins: ledger(1, 0, 0, 0),
        };

        let outcome = f.purchases.commit(&purchase).await.expect("Commit failed");
        assert_eq!(outcome, CommitOutcome::Applied);

        let product = f.products.get_by_id(f.product_id).await.unwrap().unwrap();
        assert_eq!(product.available, 2);
    }

    #[tokio::test]
    async fn test_unchanged_ledger_still_needs_match() {
        let f = setup().await;
        f.balances.deposit(f.buyer_id, Coin::Ten).await.unwrap();

        // Rewriting the priced ledger unchanged must not hide a concurrent deposit
        let purchase = PurchaseCommit {
            user_id: f.buyer_id,
            product_id: f.product_id,
            quantity: 1,
            expected_available: 3,
            expected_coins: ledger(1, 0, 0, 0),
            new_coins: ledger(1, 0, 0, 0),
        };

        let outcome = f.purchases.commit(&purchase).await.expect("Commit failed");
        assert_eq!(outcome, CommitOutcome::Conflict);

        let product = f.products.get_by_id(f.product_id).await.unwrap().unwrap();
        assert_eq!(product.available, 3);
    }

    #[tokio::test]
    #[ignore = "Requires MySQL server"]
    async fn test_mysql_unchanged_ledger_conflict() {
        use crate::config::DatabaseConfig;
        use crate::db::create_pool;

        let url = std::env::var("MYSQL_TEST_URL")
            .unwrap_or_else(|_| "mysql://root@localhost/vendo_test".to_string());
        let pool = create_pool(&DatabaseConfig {
            driver: DatabaseDriver::Mysql,
            url,
        })
        .await
        .expect("Failed to create pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        let users = SqlxUserRepository::new(pool.clone());
        let seller = User::new(format!("s{}", suffix), "hash".to_string(), UserRole::Seller);
        let buyer = User::new(format!("b{}", suffix), "hash".to_string(), UserRole::Buyer);
        users.create(&seller).await.unwrap();
        users.create(&buyer).await.unwrap();

        let balances = SqlxBalanceRepository::new(pool.clone());
        balances.create(&Balance::empty(buyer.id)).await.unwrap();
        balances.deposit(buyer.id, Coin::Hundred).await.unwrap();
        balances.deposit(buyer.id, Coin::Ten).await.unwrap();

        let products = SqlxProductRepository::new(pool.clone());
        let product = Product::new(format!("Free{}", suffix), 0, 3, seller.id);
        products.create(&product).await.unwrap();

        let purchases = SqlxPurchaseRepository::new(pool);
        let stale = PurchaseCommit {
            user_id: buyer.id,
            product_id: product.id,
            quantity: 1,
            expected_available: 3,
            expected_coins: ledger(1, 0, 0, 0),
            new_coins: ledger(1, 0, 0, 0),
        };
        assert_eq!(purchases.commit(&stale).await.unwrap(), CommitOutcome::Conflict);

        let current = PurchaseCommit {
            expected_coins: ledger(1, 0, 1, 0),
            new_coins: ledger(1, 0, 1, 0),
            ..stale
        };
        assert_eq!(purchases.commit(&current).await.unwrap(), CommitOutcome::Applied);
    }
}
