//! Order cancellation: release reserved stock in one transaction.

use std::time::Instant;

use common::OrderId;
use domain::{Order, OrderStatus};
use order_store::{OrderStore, StoreTransaction};

use crate::error::{OrderError, Result};
use crate::locking::lock_products;

/// Cancels orders and returns their stock.
///
/// The order row is locked before any product row, and the reservation side
/// never locks an existing order, so the two coordinators cannot deadlock.
pub struct ReleaseCoordinator<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> ReleaseCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Cancels a pending or confirmed order and restores its stock.
    ///
    /// Items whose product has since been deleted are skipped.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let started = Instant::now();
        let result = self.try_cancel(order_id).await;
        metrics::histogram!("order_cancel_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_cancelled_total").increment(1);
                tracing::info!(order_number = %order.order_number(), "order cancelled");
            }
            Err(err) => {
                metrics::counter!(
                    "order_operation_failures_total",
                    "operation" => "cancel",
                    "reason" => err.reason()
                )
                .increment(1);
                tracing::warn!(error = %err, "order cancellation failed");
            }
        }
        result
    }

    async fn try_cancel(&self, order_id: OrderId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        match release(&mut tx, order_id).await {
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
}

async fn release<T: StoreTransaction>(tx: &mut T, order_id: OrderId) -> Result<Order> {
    let mut order = tx
        .lock_order(order_id)
        .await?
        .ok_or(OrderError::OrderNotFound(order_id))?;

    match order.cancel() {
        Ok(_) => {}
        Err(OrderStatus::Cancelled) => return Err(OrderError::AlreadyCancelled(order_id)),
        Err(status) => return Err(OrderError::InvalidState { order_id, status }),
    }

    let skus: Vec<_> = order.items().iter().map(|item| item.sku.clone()).collect();
    let mut products = lock_products(tx, &skus).await?;

    for item in order.items() {
        match products.get_mut(&item.sku) {
            Some(Some(product)) => product
                .restore(item.quantity)
                .map_err(|_| OrderError::StockOverflow {
                    sku: item.sku.clone(),
                })?,
            _ => {
                metrics::counter!("order_restock_skipped_total").increment(1);
                tracing::warn!(
                    sku = %item.sku,
                    quantity = item.quantity,
                    "product no longer exists, skipping stock restoration"
                );
            }
        }
    }

    for product in products.values().flatten() {
        tx.save_product(product).await?;
    }
    tx.save_order(&order).await?;

    let items = order
        .items()
        .iter()
        .map(|item| {
            let info = products
                .get(&item.sku)
                .and_then(|product| product.as_ref())
                .map(|product| product.info());
            item.clone().with_product(info)
        })
        .collect();
    Ok(order.with_items(items))
}
