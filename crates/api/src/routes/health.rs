//! Liveness endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use order_store::OrderStore;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
}

/// GET /health: the process is up and serving.
pub async fn check<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store: state.store_kind,
    })
}
