//! User model
//!
//! This module defines the User entity and the closed set of roles a
//! vending machine account can hold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User entity representing a registered account.
///
/// The role is fixed at registration and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: Uuid,
    /// Username (unique, alphanumeric, 5-20 chars)
    pub username: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// User role
    pub role: UserRole,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with a freshly generated id.
    ///
    /// Note: The password should already be hashed before calling this function.
    /// Use `services::password::hash_password()` to hash the password.
    pub fn new(username: String, password_hash: String, role: UserRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            role,
            created_at: Utc::now(),
        }
    }

    /// Check if the user deposits coins and buys products
    pub fn is_buyer(&self) -> bool {
        self.role.is_buyer()
    }
}

/// User role for authorization.
///
/// - Buyer: deposits coins, buys products, holds a coin ledger
/// - Seller: creates, updates and deletes own products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Buyer,
    Seller,
}

impl UserRole {
    pub fn is_buyer(self) -> bool {
        match self {
            UserRole::Buyer => true,
            UserRole::Seller => false,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Buyer => write!(f, "buyer"),
            UserRole::Seller => write!(f, "seller"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buyer" => Ok(UserRole::Buyer),
            "seller" => Ok(UserRole::Seller),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Input for creating a new user (before password hashing)
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    /// Username
    pub username: String,
    /// Plaintext password (will be hashed)
    pub password: String,
    /// Requested role
    pub role: UserRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new() {
        let user = User::new("buyer01".to_string(), "hash".to_string(), UserRole::Buyer);

        assert!(!user.id.is_nil());
        assert_eq!(user.username, "buyer01");
        assert_eq!(user.role, UserRole::Buyer);
        assert!(user.is_buyer());
    }

    #[test]
    fn test_user_ids_are_unique() {
        let a = User::new("sellerA".to_string(), "hash".to_string(), UserRole::Seller);
        let b = User::new("sellerB".to_string(), "hash".to_string(), UserRole::Seller);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_user_role_display() {
        assert_eq!(UserRole::Buyer.to_string(), "buyer");
        assert_eq!(UserRole::Seller.to_string(), "seller");
    }

    #[test]
    fn test_user_role_from_str() {
        assert_eq!(UserRole::from_str("buyer").unwrap(), UserRole::Buyer);
        assert_eq!(UserRole::from_str("SELLER").unwrap(), UserRole::Seller);
        assert!(UserRole::from_str("admin").is_err());
    }

    #[test]
    fn test_user_role_serde() {
        assert_eq!(serde_json::to_string(&UserRole::Seller).unwrap(), "\"seller\"");
        let role: UserRole = serde_json::from_str("\"buyer\"").unwrap();
        assert_eq!(role, UserRole::Buyer);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("buyer01".to_string(), "secret-hash".to_string(), UserRole::Buyer);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
