//! Orders and their line items.

use chrono::{DateTime, SubsecRound, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AmountOverflow;
use crate::order_number::OrderNumber;
use crate::product::ProductInfo;
use crate::status::OrderStatus;
use crate::value_objects::{Money, Sku};

/// Unique identifier for an order item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderItemId(Uuid);

impl OrderItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A line of an order.
///
/// The SKU is a lookup key only; the product may be deleted later. The unit
/// price is the snapshot taken when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub sku: Sku,
    pub quantity: u32,
    pub unit_price: Money,
    /// Filled in on reads while the referenced product still exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductInfo>,
}

impl OrderItem {
    /// Creates an item priced at `unit_price`.
    pub fn new(sku: impl Into<Sku>, quantity: u32, unit_price: Money) -> Self {
        Self {
            id: OrderItemId::new(),
            sku: sku.into(),
            quantity,
            unit_price,
            product: None,
        }
    }

    /// Attaches product display info.
    pub fn with_product(mut self, product: Option<ProductInfo>) -> Self {
        self.product = product;
        self
    }

    /// Returns quantity * unit price, or `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// An order record.
///
/// Everything except the status is fixed once the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: OrderNumber,
    status: OrderStatus,
    total_amount: Money,
    created_at: DateTime<Utc>,
    items: Vec<OrderItem>,
}

impl Order {
    /// Places a new pending order, computing the total from its items.
    ///
    /// The timestamp is truncated to microseconds, the precision the
    /// PostgreSQL ledger keeps.
    pub fn place(
        order_number: OrderNumber,
        items: Vec<OrderItem>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AmountOverflow> {
        let total_amount = items.iter().try_fold(Money::zero(), |total, item| {
            item.line_total()
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| AmountOverflow {
                    sku: item.sku.to_string(),
                })
        })?;

        Ok(Self {
            id: OrderId::new(),
            order_number,
            status: OrderStatus::Pending,
            total_amount,
            created_at: created_at.trunc_subsecs(6),
            items,
        })
    }

    /// Rebuilds an order from stored columns.
    pub fn from_parts(
        id: OrderId,
        order_number: OrderNumber,
        status: OrderStatus,
        total_amount: Money,
        created_at: DateTime<Utc>,
        items: Vec<OrderItem>,
    ) -> Self {
        Self {
            id,
            order_number,
            status,
            total_amount,
            created_at,
            items,
        }
    }

    /// Replaces the order number of an order that has not been stored yet.
    pub fn with_order_number(mut self, order_number: OrderNumber) -> Self {
        self.order_number = order_number;
        self
    }

    /// Replaces the items, keeping the total. Used when hydrating reads.
    pub fn with_items(mut self, items: Vec<OrderItem>) -> Self {
        self.items = items;
        self
    }

    /// Moves the order to `Cancelled`.
    ///
    /// Returns the previous status; fails with the current status when the
    /// order cannot be cancelled.
    pub fn cancel(&mut self) -> Result<OrderStatus, OrderStatus> {
        if !self.status.can_cancel() {
            return Err(self.status);
        }
        let previous = self.status;
        self.status = OrderStatus::Cancelled;
        Ok(previous)
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns the summed quantity ordered for a SKU.
    pub fn quantity_of(&self, sku: &Sku) -> u64 {
        self.items
            .iter()
            .filter(|item| &item.sku == sku)
            .map(|item| u64::from(item.quantity))
            .sum()
    }
}
