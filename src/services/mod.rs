//! Services layer - Business logic
//!
//! Services implement the business rules on top of the repositories:
//! - token issuance and session-bound validation
//! - registration, login and logout
//! - coin deposits, purchases and change-making
//! - seller product management

pub mod change;
pub mod password;
pub mod product;
pub mod token;
pub mod user;
pub mod vending;

pub use change::compute_change;
pub use password::{hash_password, verify_password};
pub use product::{ProductService, ProductServiceError};
pub use token::{
    AccessClaims, AuthError, KeyResolver, RefreshGrant, TokenClaims, TokenService, TokenSubject,
    TokenType,
};
pub use user::{TokenPair, UserService, UserServiceError};
pub use vending::{PurchaseReceipt, VendingError, VendingService, MAX_PURCHASE_QUANTITY};
