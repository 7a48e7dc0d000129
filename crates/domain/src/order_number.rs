//! Human-readable order numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order number shown to customers, e.g. `ORD-20260115-9F3A61C2`.
///
/// Uniqueness is enforced by the order ledger, not by the generator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of candidate order numbers.
pub trait OrderNumberGenerator: Send + Sync {
    /// Produces a fresh candidate for an order placed at `now`.
    fn generate(&self, now: DateTime<Utc>) -> OrderNumber;
}

/// Date prefix plus 32 random bits taken from a v4 UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomOrderNumbers;

impl OrderNumberGenerator for RandomOrderNumbers {
    fn generate(&self, now: DateTime<Utc>) -> OrderNumber {
        let token = Uuid::new_v4().simple().to_string();
        OrderNumber(format!(
            "ORD-{}-{}",
            now.format("%Y%m%d"),
            token[..8].to_ascii_uppercase()
        ))
    }
}
