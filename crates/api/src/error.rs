//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orders::OrderError;
use stock::StockError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Order coordinator error.
    Order(OrderError),
    /// Stock component error.
    Stock(StockError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Order(err) => (order_error_status(&err), err.to_string()),
            ApiError::Stock(err) => (stock_error_status(&err), err.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn order_error_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::Validation(_) => StatusCode::BAD_REQUEST,
        OrderError::NotFound(_) | OrderError::ItemNotFound(_) => StatusCode::NOT_FOUND,
        OrderError::InsufficientStock { .. } | OrderError::InvalidStatusTransition { .. } => {
            StatusCode::CONFLICT
        }
        OrderError::Stock(stock) => stock_error_status(stock),
        _ if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn stock_error_status(err: &StockError) -> StatusCode {
    match err {
        StockError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
        StockError::ItemNotFound(_) => StatusCode::NOT_FOUND,
        _ if err.is_business_rule_violation() || err.is_consistency_anomaly() => {
            StatusCode::CONFLICT
        }
        _ if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<StockError> for ApiError {
    fn from(err: StockError) -> Self {
        ApiError::Stock(err)
    }
}

#[cfg(test)]
mod tests {
    use common::{ItemId, OrderId};
    use orders::OrderStatus;

    use super::*;

    #[test]
    fn test_order_error_statuses() {
        assert_eq!(
            order_error_status(&OrderError::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            order_error_status(&OrderError::NotFound(OrderId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            order_error_status(&OrderError::InsufficientStock {
                item_id: ItemId::new("1"),
                requested: 2
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            order_error_status(&OrderError::InvalidStatusTransition {
                from: OrderStatus::Ready,
                to: OrderStatus::Paid
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            order_error_status(&OrderError::Database(sqlx::Error::PoolTimedOut)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            order_error_status(&OrderError::InvalidData("bad".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_stock_error_statuses() {
        assert_eq!(
            stock_error_status(&StockError::NoActiveReservation(OrderId::new())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            stock_error_status(&StockError::Database(sqlx::Error::PoolTimedOut)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            order_error_status(&OrderError::Stock(StockError::Database(
                sqlx::Error::PoolTimedOut
            ))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
