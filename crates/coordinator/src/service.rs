//! Entry point bundling the coordinators with the read path.

use std::sync::Arc;

use common::OrderId;
use domain::{CreateOrder, Order, OrderNumberGenerator};
use order_store::{OrderPage, OrderQuery, OrderStore};

use crate::error::{OrderError, Result};
use crate::release::ReleaseCoordinator;
use crate::reservation::ReservationCoordinator;

/// Order operations over a single store.
pub struct OrderService<S: OrderStore + Clone> {
    store: S,
    reservations: ReservationCoordinator<S>,
    releases: ReleaseCoordinator<S>,
}

impl<S: OrderStore + Clone> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            reservations: ReservationCoordinator::new(store.clone()),
            releases: ReleaseCoordinator::new(store.clone()),
            store,
        }
    }

    /// Replaces the order number generator used for new orders.
    pub fn with_order_numbers(mut self, order_numbers: Arc<dyn OrderNumberGenerator>) -> Self {
        self.reservations = self.reservations.with_order_numbers(order_numbers);
        self
    }

    /// Gets a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn create_order(&self, command: &CreateOrder) -> Result<Order> {
        self.reservations.create_order(command).await
    }

    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        self.releases.cancel_order(order_id).await
    }

    /// Loads an order with its items.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    /// Lists orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        query.validate()?;
        Ok(self.store.list_orders(query).await?)
    }
}
