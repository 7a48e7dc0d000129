//! Order status machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of an order.
///
/// Transitions:
/// ```text
/// Pending ───┬──► Confirmed
///            │        │
///            └────────┴──► Cancelled
/// ```
///
/// Only the reservation coordinator creates orders (always `Pending`) and
/// only the release coordinator moves them to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Stock is reserved, the order awaits confirmation.
    #[default]
    Pending,

    /// The order was confirmed downstream.
    Confirmed,

    /// The order was cancelled and its stock released (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}
