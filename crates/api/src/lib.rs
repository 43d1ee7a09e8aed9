//! HTTP operations surface and process bootstrap for the order saga.
//!
//! Exposes order creation, merge updates, status queries, the payment-completion and
//! kitchen-ready notifications, and the stock catalog over REST.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use orders::OrderService;
use stock::StockService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use bootstrap::{Backends, StartupError, build_backends};
pub use config::Config;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub stock: StockService,
}

impl AppState {
    pub fn new(orders: OrderService) -> Self {
        let stock = orders.stock().clone();
        Self { orders, stock }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/api/customers/{customer_id}/orders",
            post(routes::orders::create),
        )
        .route(
            "/api/customers/{customer_id}/orders/{order_id}",
            get(routes::orders::get).put(routes::orders::update),
        )
        .route("/api/orders", get(routes::orders::list_by_status))
        .route(
            "/api/orders/{order_id}/payment-completed",
            post(routes::orders::payment_completed),
        )
        .route("/api/orders/{order_id}/ready", post(routes::orders::ready))
        .route(
            "/api/orders/{order_id}/reservations",
            get(routes::orders::reservations),
        )
        .route("/api/menu", get(routes::items::menu))
        .route("/api/items", get(routes::items::list))
        .route(
            "/api/items/availability",
            post(routes::items::availability),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
