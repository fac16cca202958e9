//! Database layer
//!
//! Storage for users, sessions, coin balances and products. Two backends are
//! supported:
//! - SQLite (default, single file next to the binary)
//! - MySQL (shared deployments)
//!
//! The driver is selected from configuration and hidden behind the
//! [`DatabasePool`] trait; repositories dispatch on [`DatabasePool::driver`].
//!
//! # Usage
//!
//! ```ignore
//! use vendo::config::DatabaseConfig;
//! use vendo::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
