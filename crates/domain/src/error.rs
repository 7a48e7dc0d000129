//! Domain error types.

use thiserror::Error;

/// Malformed input rejected before any transaction is opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The order has no line items.
    #[error("Order must contain at least one item")]
    NoItems,

    /// A line item has a blank SKU.
    #[error("Item {index} has an empty SKU")]
    EmptySku { index: usize },

    /// A line item quantity is zero or negative.
    #[error("Quantity must be at least 1 (SKU {sku}, got {quantity})")]
    InvalidQuantity { sku: String, quantity: i64 },

    /// A line item quantity does not fit the stock column.
    #[error("Quantity {quantity} for SKU {sku} exceeds the maximum of {max}")]
    QuantityTooLarge { sku: String, quantity: i64, max: i64 },

    /// A list query parameter is out of range.
    #[error("Invalid query parameter {field}: {reason}")]
    InvalidQuery {
        field: &'static str,
        reason: String,
    },
}

/// Stock arithmetic failures on a single product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StockError {
    /// Not enough units available to reserve.
    #[error("insufficient stock: available {available}, requested {requested}")]
    Insufficient { available: u32, requested: u32 },

    /// Restoring units would overflow the stock counter.
    #[error("stock overflow: available {available}, restoring {restoring}")]
    Overflow { available: u32, restoring: u32 },
}

/// An order total does not fit the money representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("order total overflows at SKU {sku}")]
pub struct AmountOverflow {
    pub sku: String,
}
