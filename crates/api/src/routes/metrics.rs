//! Prometheus scrape endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use order_store::OrderStore;

use crate::AppState;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics: counters and histograms in Prometheus text format.
pub async fn render<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_TEXT)], state.metrics.render())
}
