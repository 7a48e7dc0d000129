use std::time::Duration;

use async_trait::async_trait;
use domain::{Order, OrderItem, Product, Sku};

use crate::{OrderId, OrderPage, OrderQuery, Result};

/// Default upper bound on how long a transaction waits for a row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// An open unit of work against the inventory store and order ledger.
///
/// Row locks taken through `lock_product` / `lock_order` are exclusive and
/// held until `commit` or `rollback`. Dropping a transaction without
/// committing rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Locks a product row and returns its current state.
    ///
    /// Returns None if no product has this SKU. Locking the same SKU twice in
    /// one transaction returns the staged row without blocking.
    async fn lock_product(&mut self, sku: &Sku) -> Result<Option<Product>>;

    /// Writes a product row previously locked by this transaction.
    async fn save_product(&mut self, product: &Product) -> Result<()>;

    /// Locks an order row and returns it with its items.
    ///
    /// Returns None if the order doesn't exist.
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Inserts a new order, or persists the status of an order locked by this
    /// transaction. The number, total and timestamp of a stored order never
    /// change.
    ///
    /// Inserting an order whose number is taken fails with
    /// `DuplicateOrderNumber` and leaves the transaction usable.
    async fn save_order(&mut self, order: &Order) -> Result<()>;

    /// Inserts the items of an order inserted by this transaction.
    async fn save_order_items(&mut self, order_id: OrderId, items: &[OrderItem]) -> Result<()>;

    /// Atomically publishes every write and releases all locks.
    async fn commit(self) -> Result<()>;

    /// Discards every write and releases all locks.
    async fn rollback(self) -> Result<()>;
}

/// Durable products, orders and order items.
///
/// All implementations must be thread-safe (Send + Sync). Only the
/// coordinators write through transactions; the remaining methods are reads
/// of committed state and never wait on a row lock held by a transaction.
#[async_trait]
pub trait OrderStore: Send + Sync {
    type Transaction: StoreTransaction + 'static;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Self::Transaction>;

    /// Reads a product without locking it.
    async fn get_product(&self, sku: &Sku) -> Result<Option<Product>>;

    /// Reads an order with its items hydrated with product info.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists orders matching a query, newest first.
    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage>;
}
