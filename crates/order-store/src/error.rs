use common::OrderId;
use domain::OrderNumber;
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row lock could not be acquired within the configured timeout.
    #[error("Lock wait timed out on {resource}")]
    LockTimeout { resource: String },

    /// The database aborted the transaction (deadlock or serialization failure).
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    /// The database could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Another order already uses this order number.
    #[error("Duplicate order number: {0}")]
    DuplicateOrderNumber(OrderNumber),

    /// A write was attempted on a row this transaction has not locked.
    #[error("Row not locked by this transaction: {resource}")]
    NotLocked { resource: String },

    /// Items were saved for an order that was not inserted in this transaction.
    #[error("Order {0} was not inserted in this transaction")]
    UnknownOrder(OrderId),

    /// The commit itself failed.
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// A stored row could not be mapped to a domain value.
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if the caller may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::LockTimeout { .. }
                | StoreError::TransactionConflict(_)
                | StoreError::Unavailable(_)
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // lock_not_available, raised when lock_timeout expires
                Some("55P03") => StoreError::LockTimeout {
                    resource: db_err.message().to_string(),
                },
                // deadlock_detected, serialization_failure
                Some("40P01") | Some("40001") => {
                    StoreError::TransactionConflict(db_err.message().to_string())
                }
                _ => StoreError::Database(err),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
