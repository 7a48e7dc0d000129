//! Product rows as seen by the coordinators.

use serde::{Deserialize, Serialize};

use crate::error::StockError;
use crate::value_objects::{Money, Sku};

/// Largest stock level a product row can hold. Matches the signed 32-bit
/// column the PostgreSQL store uses.
pub const MAX_STOCK: u32 = i32::MAX as u32;

/// A product with its available stock and unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub sku: Sku,
    pub name: String,
    /// Units available for reservation.
    pub stock_qty: u32,
    /// Current unit price.
    pub price: Money,
}

impl Product {
    pub fn new(sku: impl Into<Sku>, name: impl Into<String>, stock_qty: u32, price: Money) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            stock_qty,
            price,
        }
    }

    /// Takes `quantity` units out of available stock.
    ///
    /// Leaves the product untouched when there is not enough stock.
    pub fn reserve(&mut self, quantity: u32) -> Result<(), StockError> {
        self.stock_qty = self
            .stock_qty
            .checked_sub(quantity)
            .ok_or(StockError::Insufficient {
                available: self.stock_qty,
                requested: quantity,
            })?;
        Ok(())
    }

    /// Puts `quantity` units back into available stock.
    ///
    /// Fails without changing stock if the result would exceed [`MAX_STOCK`].
    pub fn restore(&mut self, quantity: u32) -> Result<(), StockError> {
        self.stock_qty = self
            .stock_qty
            .checked_add(quantity)
            .filter(|restored| *restored <= MAX_STOCK)
            .ok_or(StockError::Overflow {
                available: self.stock_qty,
                restoring: quantity,
            })?;
        Ok(())
    }

    /// Returns the display info attached to order items on reads.
    pub fn info(&self) -> ProductInfo {
        ProductInfo {
            sku: self.sku.clone(),
            name: self.name.clone(),
        }
    }
}

/// Product details attached to an order item when it is read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub sku: Sku,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn laptop(stock: u32) -> Product {
        Product::new("SKU001", "Laptop", stock, Money::from_cents(129999))
    }

    #[test]
    fn test_reserve_decrements_stock() {
        let mut product = laptop(50);
        product.reserve(15).unwrap();
        assert_eq!(product.stock_qty, 35);
    }

    #[test]
    fn test_reserve_exact_stock_leaves_zero() {
        let mut product = laptop(5);
        product.reserve(5).unwrap();
        assert_eq!(product.stock_qty, 0);
    }

    #[test]
    fn test_reserve_more_than_available_is_rejected() {
        let mut product = laptop(5);
        let err = product.reserve(15).unwrap_err();
        assert_eq!(
            err,
            StockError::Insufficient {
                available: 5,
                requested: 15
            }
        );
        assert_eq!(product.stock_qty, 5);
    }

    #[test]
    fn test_restore_increments_stock() {
        let mut product = laptop(5);
        product.restore(10).unwrap();
        assert_eq!(product.stock_qty, 15);
    }

    #[test]
    fn test_restore_overflow_is_rejected() {
        let mut product = laptop(u32::MAX);
        assert!(matches!(
            product.restore(1),
            Err(StockError::Overflow { .. })
        ));
        assert_eq!(product.stock_qty, u32::MAX);
    }

    #[test]
    fn test_restore_is_capped_at_max_stock() {
        let mut product = laptop(MAX_STOCK - 3);
        product.restore(3).unwrap();
        assert_eq!(product.stock_qty, MAX_STOCK);

        let err = product.restore(1).unwrap_err();
        assert_eq!(
            err,
            StockError::Overflow {
                available: MAX_STOCK,
                restoring: 1
            }
        );
        assert_eq!(product.stock_qty, MAX_STOCK);
    }
}
