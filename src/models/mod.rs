//! Data models
//!
//! This module contains all data structures used throughout the vending service.
//! Models represent:
//! - Database entities (User, Session, Balance, Product)
//! - The coin ledger and the fixed coin denominations
//! - Service input types

mod balance;
mod product;
mod session;
mod user;

pub use balance::{Balance, Coin, CoinLedger, InvalidCoin};
pub use product::{CreateProductInput, Product, UpdateProductInput};
pub use session::Session;
pub use user::{CreateUserInput, User, UserRole};
