//! Order creation: reserve stock and record the order in one transaction.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use domain::{
    CreateOrder, Order, OrderItem, OrderNumberGenerator, Product, RandomOrderNumbers, Sku,
    ValidLine, quantities_by_sku,
};
use order_store::{OrderStore, StoreError, StoreTransaction};

use crate::error::{OrderError, Result};
use crate::locking::lock_products;

/// How many order numbers are tried before creation gives up.
pub const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 5;

/// Creates orders, reserving stock for every line atomically.
///
/// Either the order, its items and every stock decrement are committed
/// together, or nothing is.
pub struct ReservationCoordinator<S: OrderStore> {
    store: S,
    order_numbers: Arc<dyn OrderNumberGenerator>,
}

impl<S: OrderStore> ReservationCoordinator<S> {
    /// Creates a coordinator using random order numbers.
    pub fn new(store: S) -> Self {
        Self {
            store,
            order_numbers: Arc::new(RandomOrderNumbers),
        }
    }

    /// Replaces the order number generator.
    pub fn with_order_numbers(mut self, order_numbers: Arc<dyn OrderNumberGenerator>) -> Self {
        self.order_numbers = order_numbers;
        self
    }

    /// Validates the command, reserves stock and records a pending order.
    ///
    /// Returns the committed order with its items carrying product names.
    #[tracing::instrument(skip(self, command), fields(lines = command.items.len()))]
    pub async fn create_order(&self, command: &CreateOrder) -> Result<Order> {
        let started = Instant::now();
        let result = self.try_create(command).await;
        metrics::histogram!("order_create_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = %order.id(),
                    order_number = %order.order_number(),
                    total = %order.total_amount(),
                    "order created"
                );
            }
            Err(err) => {
                metrics::counter!(
                    "order_operation_failures_total",
                    "operation" => "create",
                    "reason" => err.reason()
                )
                .increment(1);
                tracing::warn!(error = %err, "order creation failed");
            }
        }
        result
    }

    async fn try_create(&self, command: &CreateOrder) -> Result<Order> {
        let lines = command.validate()?;
        let requested = quantities_by_sku(&lines)?;

        let mut tx = self.store.begin().await?;
        match self.reserve(&mut tx, &lines, &requested).await {
            Ok(order) => {
                tx.commit().await.map_err(|err| {
                    tracing::error!(error = %err, "commit failed");
                    OrderError::commit_failed(err)
                })?;
                Ok(order)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn reserve(
        &self,
        tx: &mut S::Transaction,
        lines: &[ValidLine],
        requested: &BTreeMap<Sku, u32>,
    ) -> Result<Order> {
        let skus: Vec<Sku> = requested.keys().cloned().collect();
        let mut products: BTreeMap<Sku, Product> = BTreeMap::new();
        for (sku, product) in lock_products(tx, &skus).await? {
            let mut product = product.ok_or_else(|| OrderError::ProductNotFound(sku.clone()))?;
            let quantity = requested.get(&sku).copied().unwrap_or_default();

            if product.reserve(quantity).is_err() {
                return Err(OrderError::InsufficientStock {
                    sku,
                    name: product.name,
                    available: product.stock_qty,
                    requested: quantity,
                });
            }
            tx.save_product(&product).await?;
            products.insert(sku, product);
        }

        let items = lines
            .iter()
            .map(|line| {
                let product = products
                    .get(&line.sku)
                    .ok_or_else(|| OrderError::ProductNotFound(line.sku.clone()))?;
                Ok(OrderItem::new(line.sku.clone(), line.quantity, product.price)
                    .with_product(Some(product.info())))
            })
            .collect::<Result<Vec<_>>>()?;

        let now = Utc::now();
        let order = Order::place(self.order_numbers.generate(now), items, now)?;
        self.insert_order(tx, order, now).await
    }

    /// Inserts the order, drawing a new number whenever the current one is
    /// already taken.
    async fn insert_order(
        &self,
        tx: &mut S::Transaction,
        mut order: Order,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
            match tx.save_order(&order).await {
                Ok(()) => {
                    tx.save_order_items(order.id(), order.items()).await?;
                    return Ok(order);
                }
                Err(StoreError::DuplicateOrderNumber(number)) => {
                    metrics::counter!("order_number_collisions_total").increment(1);
                    tracing::warn!(%number, attempt, "order number already taken");
                    order = order.with_order_number(self.order_numbers.generate(now));
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(OrderError::OrderNumberExhausted {
            attempts: MAX_ORDER_NUMBER_ATTEMPTS,
        })
    }
}
