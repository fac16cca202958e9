//! Product model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product listed in the machine by a seller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier
    pub id: Uuid,
    /// Display name (unique)
    pub name: String,
    /// Unit price in cents, always a multiple of 5
    pub price: u32,
    /// Units left in the machine (0-99)
    pub available: u32,
    /// Owning seller
    pub seller_id: Uuid,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Create a new product owned by `seller_id`
    pub fn new(name: String, price: u32, available: u32, seller_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            price,
            available,
            seller_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub price: u32,
    pub available: u32,
}

/// Input for updating a product (all listing fields are replaced)
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProductInput {
    pub name: String,
    pub price: u32,
    pub available: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_new() {
        let seller = Uuid::new_v4();
        let product = Product::new("Cola".to_string(), 65, 10, seller);

        assert_eq!(product.name, "Cola");
        assert_eq!(product.price, 65);
        assert_eq!(product.available, 10);
        assert_eq!(product.seller_id, seller);
        assert_eq!(product.created_at, product.updated_at);
    }
}
