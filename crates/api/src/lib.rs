//! HTTP API server with observability for inventory-backed orders.
//!
//! Provides REST endpoints for creating, listing and cancelling orders,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use coordinator::OrderService;
use domain::{Money, Product};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore + Clone> {
    pub service: OrderService<S>,
    pub metrics: PrometheusHandle,
    /// Which store backs the service, reported by `/health`.
    pub store_kind: &'static str,
}

impl<S: OrderStore + Clone> AppState<S> {
    pub fn new(store: S, metrics: PrometheusHandle, store_kind: &'static str) -> Self {
        Self {
            service: OrderService::new(store),
            metrics,
            store_kind,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + Clone + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/metrics", get(routes::metrics::render::<S>))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The sample catalog the in-memory store starts with. Matches the seed
/// migration applied to PostgreSQL.
pub fn demo_catalog() -> Vec<Product> {
    vec![
        Product::new("SKU001", "Laptop Dell XPS 13", 50, Money::from_cents(129999)),
        Product::new("SKU002", "Mouse Logitech MX Master", 100, Money::from_cents(9999)),
        Product::new("SKU003", "Keyboard Mechanical RGB", 75, Money::from_cents(14999)),
        Product::new("SKU004", "Monitor 27\" 4K", 30, Money::from_cents(49999)),
        Product::new("SKU005", "Webcam HD 1080p", 200, Money::from_cents(7999)),
    ]
}
