//! Order endpoints: create, list, get and cancel.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use common::OrderId;
use domain::{CreateOrder, Order, OrderItem, OrderStatus};
use order_store::{OrderPage, OrderQuery, OrderStore};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

/// Raw list filters; parsed by hand so bad input gets the JSON error envelope.
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersParams {
    pub status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListOrdersParams {
    fn into_query(self) -> Result<OrderQuery, ApiError> {
        let mut query = OrderQuery::new();

        if let Some(status) = non_empty(self.status) {
            let status = status.parse::<OrderStatus>().map_err(|_| {
                ApiError::BadRequest(
                    "Validation failed: status must be one of PENDING, CONFIRMED, CANCELLED"
                        .to_string(),
                )
            })?;
            query = query.status(status);
        }
        if let Some(from) = non_empty(self.from) {
            query = query.since(parse_timestamp("from", &from)?);
        }
        if let Some(to) = non_empty(self.to) {
            query = query.until(parse_timestamp("to", &to)?);
        }

        let page = parse_number("page", self.page)?.unwrap_or(query.page);
        let limit = parse_number("limit", self.limit)?.unwrap_or(query.limit);
        Ok(query.page(page, limit))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Validation failed: {field} must be an ISO 8601 date or timestamp"
            ))
        })
}

fn parse_number(field: &str, value: Option<String>) -> Result<Option<u32>, ApiError> {
    non_empty(value)
        .map(|v| {
            v.trim().parse::<u32>().map_err(|_| {
                ApiError::BadRequest(format!(
                    "Validation failed: {field} must be a positive integer"
                ))
            })
        })
        .transpose()
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest("Invalid order ID".to_string()))
}

// -- Response types --

/// Success envelope shared by every order endpoint.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: &'static str,
    pub data: T,
}

impl<T> ApiResponse<T> {
    fn ok(message: &'static str, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message,
            data,
        })
    }
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_amount: String,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub item_count: usize,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub id: String,
    pub sku: String,
    pub product_name: Option<String>,
    pub quantity: u32,
    pub unit_price: String,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub pagination: Pagination,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id.to_string(),
            sku: item.sku.to_string(),
            product_name: item.product.as_ref().map(|p| p.name.clone()),
            quantity: item.quantity,
            unit_price: item.unit_price.to_decimal_string(),
            unit_price_cents: item.unit_price.cents(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            order_number: order.order_number().to_string(),
            status: order.status(),
            total_amount: order.total_amount().to_decimal_string(),
            total_cents: order.total_amount().cents(),
            created_at: order.created_at(),
            item_count: order.item_count(),
            items: order.items().iter().map(OrderItemResponse::from).collect(),
        }
    }
}

impl From<&OrderPage> for OrderListResponse {
    fn from(page: &OrderPage) -> Self {
        Self {
            orders: page.orders.iter().map(OrderResponse::from).collect(),
            pagination: Pagination {
                total: page.total,
                page: page.page,
                limit: page.limit,
                total_pages: page.total_pages(),
            },
        }
    }
}

// -- Handlers --

/// POST /orders: reserve stock and create a pending order.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<CreateOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ApiError> {
    let Json(command) = body.map_err(|rejection| {
        ApiError::BadRequest(format!("Validation failed: {}", rejection.body_text()))
    })?;

    let order = state.service.create_order(&command).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("Order created successfully", OrderResponse::from(&order)),
    ))
}

/// GET /orders: filtered, paginated order history.
#[tracing::instrument(skip(state, params))]
pub async fn list<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<ListOrdersParams>, QueryRejection>,
) -> Result<Json<ApiResponse<OrderListResponse>>, ApiError> {
    let Query(params) = params.map_err(|rejection| {
        ApiError::BadRequest(format!("Validation failed: {}", rejection.body_text()))
    })?;

    let page = state.service.list_orders(params.into_query()?).await?;

    Ok(ApiResponse::ok(
        "Orders retrieved successfully",
        OrderListResponse::from(&page),
    ))
}

/// GET /orders/{id}: a single order with its items.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.service.get_order(order_id).await?;

    Ok(ApiResponse::ok(
        "Order retrieved successfully",
        OrderResponse::from(&order),
    ))
}

/// POST /orders/{id}/cancel: cancel the order and release its stock.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.service.cancel_order(order_id).await?;

    Ok(ApiResponse::ok(
        "Order cancelled successfully",
        OrderResponse::from(&order),
    ))
}
