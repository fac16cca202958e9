//! Vendo - A coin-operated vending machine service
//!
//! This library provides buyer and seller accounts with session-bound
//! token authentication, coin deposits, purchases with change-making and
//! seller product management.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
