//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a specific entity.

pub mod balance;
pub mod product;
pub mod purchase;
pub mod session;
pub mod user;

pub use balance::{BalanceRepository, SqlxBalanceRepository};
pub use product::{ProductRepository, SqlxProductRepository};
pub use purchase::{CommitOutcome, PurchaseCommit, PurchaseRepository, SqlxPurchaseRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};

use anyhow::{Context, Result};
use uuid::Uuid;

/// Parse an identifier column stored as text
pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid UUID in database: {}", value))
}

/// Convert a stored integer column into a non-negative count
pub(crate) fn to_count(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).with_context(|| format!("Invalid {} in database: {}", column, value))
}

/// Whether a repository error was caused by a UNIQUE constraint
pub fn is_unique_violation(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation())
}
