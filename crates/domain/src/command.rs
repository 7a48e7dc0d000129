//! The create-order command and its input validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::value_objects::Sku;

/// Largest quantity a single line may request (the stock column is a
/// signed 32-bit integer).
pub const MAX_LINE_QUANTITY: i64 = i32::MAX as i64;

/// One requested line as received from a caller.
///
/// The quantity is signed so that negative input survives parsing and is
/// rejected by validation with a useful message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedItem {
    pub sku: String,
    #[serde(rename = "qty")]
    pub quantity: i64,
}

impl RequestedItem {
    pub fn new(sku: impl Into<String>, quantity: i64) -> Self {
        Self {
            sku: sku.into(),
            quantity,
        }
    }
}

/// Command to place an order reserving stock for every line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub items: Vec<RequestedItem>,
}

/// A line that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidLine {
    pub sku: Sku,
    pub quantity: u32,
}

impl CreateOrder {
    pub fn new(items: Vec<RequestedItem>) -> Self {
        Self { items }
    }

    /// Creates a command from `(sku, quantity)` pairs.
    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, i64)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(sku, quantity)| RequestedItem::new(sku, quantity))
                .collect(),
        )
    }

    /// Validates the command, returning its lines in request order.
    pub fn validate(&self) -> Result<Vec<ValidLine>, ValidationError> {
        if self.items.is_empty() {
            return Err(ValidationError::NoItems);
        }

        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let sku = item.sku.trim();
                if sku.is_empty() {
                    return Err(ValidationError::EmptySku { index });
                }
                if item.quantity < 1 {
                    return Err(ValidationError::InvalidQuantity {
                        sku: sku.to_string(),
                        quantity: item.quantity,
                    });
                }
                if item.quantity > MAX_LINE_QUANTITY {
                    return Err(ValidationError::QuantityTooLarge {
                        sku: sku.to_string(),
                        quantity: item.quantity,
                        max: MAX_LINE_QUANTITY,
                    });
                }
                Ok(ValidLine {
                    sku: Sku::new(sku),
                    quantity: item.quantity as u32,
                })
            })
            .collect()
    }
}

/// Sums validated lines per SKU, in ascending SKU order.
///
/// A summed quantity is held to the same maximum as a single line.
pub fn quantities_by_sku(lines: &[ValidLine]) -> Result<BTreeMap<Sku, u32>, ValidationError> {
    let mut totals: BTreeMap<Sku, u32> = BTreeMap::new();
    for line in lines {
        let entry = totals.entry(line.sku.clone()).or_insert(0);
        let summed = i64::from(*entry) + i64::from(line.quantity);
        if summed > MAX_LINE_QUANTITY {
            return Err(ValidationError::QuantityTooLarge {
                sku: line.sku.to_string(),
                quantity: summed,
                max: MAX_LINE_QUANTITY,
            });
        }
        *entry = summed as u32;
    }
    Ok(totals)
}
