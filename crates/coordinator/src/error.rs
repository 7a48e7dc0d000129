//! Coordinator error types.

use common::OrderId;
use domain::{AmountOverflow, OrderStatus, Sku, ValidationError};
use order_store::StoreError;
use thiserror::Error;

/// Errors returned by order creation, cancellation and the read path.
///
/// Every error returned from a write operation means nothing was persisted.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request was malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A requested SKU has no product.
    #[error("Product with SKU {0} not found")]
    ProductNotFound(Sku),

    /// A product has fewer units available than requested.
    #[error("Insufficient stock for {name}. Available: {available}, Requested: {requested}")]
    InsufficientStock {
        sku: Sku,
        name: String,
        available: u32,
        requested: u32,
    },

    /// No order has this id.
    #[error("Order not found")]
    OrderNotFound(OrderId),

    /// The order was cancelled before.
    #[error("Order is already cancelled")]
    AlreadyCancelled(OrderId),

    /// The order's status does not allow cancellation.
    #[error("Only PENDING or CONFIRMED orders can be cancelled (order is {status})")]
    InvalidState { order_id: OrderId, status: OrderStatus },

    /// The order total does not fit the money representation.
    #[error("Order total overflows: {0}")]
    AmountOverflow(#[from] AmountOverflow),

    /// Restoring stock would overflow a product's counter.
    #[error("Restoring stock for SKU {sku} overflows its counter")]
    StockOverflow { sku: Sku },

    /// Every generated order number collided with an existing one.
    #[error("Could not allocate a unique order number after {attempts} attempts")]
    OrderNumberExhausted { attempts: u32 },

    /// A row lock could not be acquired in time.
    #[error("Timed out waiting for a lock on {resource}")]
    LockTimeout { resource: String },

    /// The transaction failed to commit.
    #[error("Failed to commit transaction: {0}")]
    CommitFailed(StoreError),

    /// Any other store failure.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl OrderError {
    /// Wraps a failure raised while committing.
    pub fn commit_failed(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout { resource } => OrderError::LockTimeout { resource },
            other => OrderError::CommitFailed(other),
        }
    }

    /// Returns true if the caller may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrderError::LockTimeout { .. } => true,
            OrderError::Store(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation",
            OrderError::ProductNotFound(_) => "product_not_found",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::AlreadyCancelled(_) => "already_cancelled",
            OrderError::InvalidState { .. } => "invalid_state",
            OrderError::AmountOverflow(_) => "amount_overflow",
            OrderError::StockOverflow { .. } => "stock_overflow",
            OrderError::OrderNumberExhausted { .. } => "order_number_exhausted",
            OrderError::LockTimeout { .. } => "lock_timeout",
            OrderError::CommitFailed(_) => "commit_failed",
            OrderError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout { resource } => OrderError::LockTimeout { resource },
            err @ StoreError::CommitFailed(_) => OrderError::CommitFailed(err),
            other => OrderError::Store(other),
        }
    }
}

/// Convenience type alias for coordinator results.
pub type Result<T> = std::result::Result<T, OrderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_is_lifted_and_retryable() {
        let err = OrderError::from(StoreError::LockTimeout {
            resource: "product SKU001".to_string(),
        });
        assert!(matches!(err, OrderError::LockTimeout { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_commit_failure_is_not_retryable() {
        let err = OrderError::from(StoreError::CommitFailed("disk full".to_string()));
        assert!(matches!(err, OrderError::CommitFailed(_)));
        assert!(!err.is_retryable());
        assert_eq!(err.reason(), "commit_failed");
    }

    #[test]
    fn test_conflict_stays_retryable_through_store_variant() {
        let err = OrderError::from(StoreError::TransactionConflict("deadlock".to_string()));
        assert!(matches!(err, OrderError::Store(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_any_failure_at_commit_is_commit_failed() {
        let err = OrderError::commit_failed(StoreError::Unavailable("gone".to_string()));
        assert!(matches!(err, OrderError::CommitFailed(_)));
    }

    #[test]
    fn test_insufficient_stock_message() {
        let err = OrderError::InsufficientStock {
            sku: Sku::new("SKU001"),
            name: "Laptop".to_string(),
            available: 5,
            requested: 15,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Laptop. Available: 5, Requested: 15"
        );
    }

    #[test]
    fn test_domain_errors_are_final() {
        assert!(!OrderError::ProductNotFound(Sku::new("X")).is_retryable());
        assert!(!OrderError::AlreadyCancelled(OrderId::new()).is_retryable());
    }
}
