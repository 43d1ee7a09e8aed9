//! Catalog and stock availability endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use common::ItemId;
use serde::{Deserialize, Serialize};
use stock::{Item, ItemQuantity};

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ItemsQuery {
    /// Comma-separated item ids.
    pub ids: Option<String>,
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub items: Vec<ItemQuantity>,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub all_available: bool,
    pub items: Vec<Item>,
    pub shortages: Vec<ItemQuantity>,
}

/// GET /api/menu: the full catalog, read from the store.
pub async fn menu(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Item>>, ApiError> {
    Ok(Json(state.stock.get_items(&[]).await?))
}

/// GET /api/items?ids=a,b: catalog entries for the given ids, through the cache.
#[tracing::instrument(skip(state, query))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let ids: Vec<ItemId> = query
        .ids
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ItemId::from)
        .collect();
    Ok(Json(state.stock.get_items(&ids).await?))
}

/// POST /api/items/availability: checks whether every requested quantity is available.
#[tracing::instrument(skip(state, req), fields(items = req.items.len()))]
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let result = state.stock.check_stock_availability(&req.items).await?;
    Ok(Json(AvailabilityResponse {
        all_available: result.all_available,
        items: result.items,
        shortages: result.shortages,
    }))
}
