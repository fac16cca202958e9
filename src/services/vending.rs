//! Vending service
//!
//! Deposit, reset and purchase against a buyer's coin ledger.
//!
//! A purchase hands the whole ledger to the machine and replaces it with the
//! computed change. Stock and ledger are written in one transaction guarded
//! by the values read while pricing, see [`PurchaseRepository`].

use crate::db::repositories::{
    BalanceRepository, CommitOutcome, ProductRepository, PurchaseCommit, PurchaseRepository,
    UserRepository,
};
use crate::models::{Balance, Coin};
use crate::services::change::compute_change;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Largest number of units bought in one purchase
pub const MAX_PURCHASE_QUANTITY: u32 = 99;

/// Error types for vending operations
#[derive(Debug, thiserror::Error)]
pub enum VendingError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not enough money: cost {cost}, deposited {deposited}")]
    InsufficientFunds { cost: u64, deposited: u64 },

    #[error("not enough products: requested {requested}, available {available}")]
    InsufficientInventory { requested: u32, available: u32 },

    /// Stock or ledger changed while the purchase was in flight
    #[error("purchase conflicted with a concurrent update, retry")]
    Conflict,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Result of a successful purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    /// Total cost in cents
    pub spent: u64,
    /// Returned coins, largest first, one entry per coin
    pub change: Vec<u32>,
}

/// Vending service
pub struct VendingService {
    user_repo: Arc<dyn UserRepository>,
    balance_repo: Arc<dyn BalanceRepository>,
    product_repo: Arc<dyn ProductRepository>,
    purchase_repo: Arc<dyn PurchaseRepository>,
}

impl VendingService {
    /// Create a new vending service
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        balance_repo: Arc<dyn BalanceRepository>,
        product_repo: Arc<dyn ProductRepository>,
        purchase_repo: Arc<dyn PurchaseRepository>,
    ) -> Self {
        Self {
            user_repo,
            balance_repo,
            product_repo,
            purchase_repo,
        }
    }

    /// Insert one coin. `amount` must be the face value of an accepted coin.
    ///
    /// Returns the ledger after the deposit.
    pub async fn deposit(&self, user_id: Uuid, amount: u32) -> Result<Balance, VendingError> {
        let coin = Coin::try_from(amount)
            .map_err(|e| VendingError::ValidationError(e.to_string()))?;

        let affected = self
            .balance_repo
            .deposit(user_id, coin)
            .await
            .context("Failed to deposit coin")?;
        if affected == 0 {
            return Err(VendingError::NotFound("balance"));
        }

        tracing::info!("User {} deposited {}", user_id, coin);
        self.get_balance(user_id).await
    }

    /// Zero every counter of the user's ledger.
    pub async fn reset_deposit(&self, user_id: Uuid) -> Result<(), VendingError> {
        let affected = self
            .balance_repo
            .reset(user_id)
            .await
            .context("Failed to reset deposit")?;
        if affected == 0 {
            return Err(VendingError::NotFound("balance"));
        }

        tracing::info!("User {} reset their deposit", user_id);
        Ok(())
    }

    /// Current ledger of the user
    pub async fn get_balance(&self, user_id: Uuid) -> Result<Balance, VendingError> {
        self.balance_repo
            .get_by_user(user_id)
            .await
            .context("Failed to load balance")?
            .ok_or(VendingError::NotFound("balance"))
    }

    /// Buy `quantity` units of a product.
    ///
    /// Rejections leave both the ledger and the stock untouched.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if `quantity` is outside 1-99
    /// - `NotFound` if the user, product or ledger is missing
    /// - `InsufficientFunds` if the cost exceeds the deposited total
    /// - `InsufficientInventory` if fewer units are available
    /// - `Conflict` if a concurrent write changed the stock or ledger
    pub async fn buy(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<PurchaseReceipt, VendingError> {
        if !(1..=MAX_PURCHASE_QUANTITY).contains(&quantity) {
            return Err(VendingError::ValidationError(format!(
                "Amount must be between 1 and {}",
                MAX_PURCHASE_QUANTITY
            )));
        }

        self.user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to load user")?
            .ok_or(VendingError::NotFound("user"))?;
        let product = self
            .product_repo
            .get_by_id(product_id)
            .await
            .context("Failed to load product")?
            .ok_or(VendingError::NotFound("product"))?;
        let balance = self.get_balance(user_id).await?;

        let cost = u64::from(product.price) * u64::from(quantity);
        let deposited = balance.coins.total();
        if cost > deposited {
            return Err(VendingError::InsufficientFunds { cost, deposited });
        }
        if quantity > product.available {
            return Err(VendingError::InsufficientInventory {
                requested: quantity,
                available: product.available,
            });
        }

        let change = compute_change(cost, &balance.coins);

        let outcome = self
            .purchase_repo
            .commit(&PurchaseCommit {
                user_id,
                product_id,
                quantity,
                expected_available: product.available,
                expected_coins: balance.coins,
                new_coins: change,
            })
            .await
            .context("Failed to commit purchase")?;

        match outcome {
            CommitOutcome::Applied => {
                tracing::info!(
                    "User {} bought {} x {} for {}",
                    user_id,
                    quantity,
                    product.name,
                    cost
                );
                Ok(PurchaseReceipt {
                    spent: cost,
                    change: change.to_coin_sequence(),
                })
            }
            CommitOutcome::Conflict => {
                tracing::warn!("Purchase by {} of {} conflicted", user_id, product.name);
                Err(VendingError::Conflict)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxBalanceRepository, SqlxProductRepository, SqlxPurchaseRepository,
        SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CoinLedger, Product, User, UserRole};
    use proptest::prelude::*;

    struct Harness {
        service: VendingService,
        products: Arc<dyn ProductRepository>,
        buyer_id: Uuid,
        seller_id: Uuid,
    }

    async fn setup() -> Harness {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let balances = SqlxBalanceRepository::boxed(pool.clone());
        let products = SqlxProductRepository::boxed(pool.clone());
        let purchases = SqlxPurchaseRepository::boxed(pool);

        let buyer = User::new("buyer01".to_string(), "hash".to_string(), UserRole::Buyer);
        let seller = User::new("seller01".to_string(), "hash".to_string(), UserRole::Seller);
        users.create(&buyer).await.unwrap();
        users.create(&seller).await.unwrap();
        balances.create(&Balance::empty(buyer.id)).await.unwrap();

        Harness {
            service: VendingService::new(users, balances, products.clone(), purchases),
            products,
            buyer_id: buyer.id,
            seller_id: seller.id,
        }
    }

    async fn stock(h: &Harness, name: &str, price: u32, available: u32) -> Uuid {
        let product = Product::new(name.to_string(), price, available, h.seller_id);
        h.products.create(&product).await.unwrap();
        product.id
    }

    async fn deposit_all(h: &Harness, coins: &[u32]) {
        for &coin in coins {
            h.service.deposit(h.buyer_id, coin).await.expect("Deposit should succeed");
        }
    }

    #[tokio::test]
    async fn test_deposit_accumulates() {
        let h = setup().await;
        deposit_all(&h, &[50, 50, 100]).await;

        let balance = h.service.get_balance(h.buyer_id).await.unwrap();
        assert_eq!(balance.coins.hundred, 1);
        assert_eq!(balance.coins.fifty, 2);
        assert_eq!(balance.coins.total(), 200);
    }

    #[tokio::test]
    async fn test_deposit_rejects_unknown_coin() {
        let h = setup().await;
        for amount in [0, 1, 25, 200] {
            let result = h.service.deposit(h.buyer_id, amount).await;
            assert!(matches!(result, Err(VendingError::ValidationError(_))));
        }
        assert!(h.service.get_balance(h.buyer_id).await.unwrap().coins.is_empty());
    }

    #[tokio::test]
    async fn test_deposit_without_ledger() {
        let h = setup().await;
        let result = h.service.deposit(h.seller_id, 10).await;
        assert!(matches!(result, Err(VendingError::NotFound("balance"))));
    }

    #[tokio::test]
    async fn test_reset_deposit() {
        let h = setup().await;
        deposit_all(&h, &[5, 10, 20, 50, 100]).await;

        h.service.reset_deposit(h.buyer_id).await.expect("Reset should succeed");

        let balance = h.service.get_balance(h.buyer_id).await.unwrap();
        assert_eq!(balance.coins, CoinLedger::default());
    }

    #[tokio::test]
    async fn test_buy_returns_greedy_change() {
        let h = setup().await;
        let product_id = stock(&h, "Candy", 15, 10).await;
        deposit_all(&h, &[5, 5, 5, 5, 20]).await;

        let receipt = h
            .service
            .buy(h.buyer_id, product_id, 1)
            .await
            .expect("Purchase should succeed");

        assert_eq!(receipt.spent, 15);
        assert_eq!(receipt.change, vec![20, 5]);

        let balance = h.service.get_balance(h.buyer_id).await.unwrap();
        assert_eq!(balance.coins.twenty, 1);
        assert_eq!(balance.coins.five, 1);
        assert_eq!(balance.coins.total(), 25);

        let product = h.products.get_by_id(product_id).await.unwrap().unwrap();
        assert_eq!(product.available, 9);
    }

    #[tokio::test]
    async fn test_buy_multiple_units() {
        let h = setup().await;
        let product_id = stock(&h, "Water", 35, 5).await;
        deposit_all(&h, &[100, 100]).await;

        let receipt = h.service.buy(h.buyer_id, product_id, 3).await.unwrap();

        assert_eq!(receipt.spent, 105);
        assert_eq!(receipt.change, vec![50, 20, 20, 5]);
        let product = h.products.get_by_id(product_id).await.unwrap().unwrap();
        assert_eq!(product.available, 2);
    }

    #[tokio::test]
    async fn test_buy_insufficient_funds_changes_nothing() {
        let h = setup().await;
        let product_id = stock(&h, "Juice", 120, 3).await;
        deposit_all(&h, &[100, 10]).await;

        let result = h.service.buy(h.buyer_id, product_id, 1).await;
        assert!(matches!(
            result,
            Err(VendingError::InsufficientFunds { cost: 120, deposited: 110 })
        ));

        let balance = h.service.get_balance(h.buyer_id).await.unwrap();
        assert_eq!(balance.coins.total(), 110);
        let product = h.products.get_by_id(product_id).await.unwrap().unwrap();
        assert_eq!(product.available, 3);
    }

    #[tokio::test]
    async fn test_buy_insufficient_inventory_changes_nothing() {
        let h = setup().await;
        let product_id = stock(&h, "Chips", 5, 2).await;
        deposit_all(&h, &[100]).await;

        let result = h.service.buy(h.buyer_id, product_id, 3).await;
        assert!(matches!(
            result,
            Err(VendingError::InsufficientInventory { requested: 3, available: 2 })
        ));

        let balance = h.service.get_balance(h.buyer_id).await.unwrap();
        assert_eq!(balance.coins.hundred, 1);
        let product = h.products.get_by_id(product_id).await.unwrap().unwrap();
        assert_eq!(product.available, 2);
    }

    #[tokio::test]
    async fn test_buy_quantity_bounds() {
        let h = setup().await;
        let product_id = stock(&h, "Gum", 5, 99).await;

        for quantity in [0, 100] {
            let result = h.service.buy(h.buyer_id, product_id, quantity).await;
            assert!(matches!(result, Err(VendingError::ValidationError(_))));
        }
    }

    #[tokio::test]
    async fn test_buy_unknown_product() {
        let h = setup().await;
        let result = h.service.buy(h.buyer_id, Uuid::new_v4(), 1).await;
        assert!(matches!(result, Err(VendingError::NotFound("product"))));
    }

    #[tokio::test]
    async fn test_buy_free_product_returns_all_coins() {
        let h = setup().await;
        let product_id = stock(&h, "Sample", 0, 1).await;
        deposit_all(&h, &[50]).await;

        let receipt = h.service.buy(h.buyer_id, product_id, 1).await.unwrap();
        assert_eq!(receipt.spent, 0);
        assert_eq!(receipt.change, vec![50]);
    }

    fn coin_strategy() -> impl Strategy<Value = u32> {
        prop::sample::select(vec![5u32, 10, 20, 50, 100])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Each deposit raises the total by the coin value and touches one counter.
        #[test]
        fn prop_deposit_increments_one_counter(coins in prop::collection::vec(coin_strategy(), 1..12)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let h = setup().await;

                for amount in coins {
                    let before = h.service.get_balance(h.buyer_id).await.unwrap().coins;
                    let after = h.service.deposit(h.buyer_id, amount).await.unwrap().coins;

                    prop_assert_eq!(after.total(), before.total() + u64::from(amount));
                    let changed: Vec<Coin> = Coin::DESCENDING
                        .into_iter()
                        .filter(|&coin| after.count(coin) != before.count(coin))
                        .collect();
                    prop_assert_eq!(changed.len(), 1);
                    prop_assert_eq!(changed[0].value(), amount);
                    prop_assert_eq!(after.count(changed[0]), before.count(changed[0]) + 1);
                }
                Ok(())
            });
            result?;
        }
    }
}
