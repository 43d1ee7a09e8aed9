//! Order endpoints and the payment / kitchen notifications.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{CustomerId, OrderId};
use orders::{Order, OrderPatch, OrderStatus};
use serde::Deserialize;
use stock::{ItemQuantity, Reservation};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<ItemQuantity>,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

// -- Handlers --

/// POST /api/customers/{customer_id}/orders: check stock, persist and reserve.
#[tracing::instrument(skip(state, req), fields(items = req.items.len()))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .orders
        .create_order(CustomerId::new(customer_id), &req.items)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/customers/{customer_id}/orders/{order_id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path((customer_id, order_id)): Path<(String, String)>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    let order = state
        .orders
        .get_customer_order(&CustomerId::new(customer_id), order_id)
        .await?;
    Ok(Json(order))
}

/// PUT /api/customers/{customer_id}/orders/{order_id}: merge-semantics update.
#[tracing::instrument(skip(state, patch))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path((customer_id, order_id)): Path<(String, String)>,
    Json(patch): Json<OrderPatch>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    state
        .orders
        .get_customer_order(&CustomerId::new(customer_id), order_id)
        .await?;
    Ok(Json(state.orders.update_order(order_id, patch).await?))
}

/// GET /api/orders?status=paid
pub async fn list_by_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let raw = query
        .status
        .ok_or_else(|| ApiError::BadRequest("status query parameter is required".to_string()))?;
    let status = OrderStatus::parse(raw.trim())
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown order status: {raw}")))?;
    Ok(Json(state.orders.get_orders_by_status(status).await?))
}

/// POST /api/orders/{order_id}/payment-completed: the payment provider's completion notice.
#[tracing::instrument(skip(state))]
pub async fn payment_completed(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    Ok(Json(state.orders.mark_paid(order_id).await?))
}

/// POST /api/orders/{order_id}/ready: kitchen staff marks the order ready.
#[tracing::instrument(skip(state))]
pub async fn ready(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    Ok(Json(state.orders.mark_ready(order_id).await?))
}

/// GET /api/orders/{order_id}/reservations: the order's reservation ledger rows.
pub async fn reservations(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    Ok(Json(state.stock.reservations_for_order(order_id).await?))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}
