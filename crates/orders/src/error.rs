use common::{ItemId, OrderId};
use stock::StockError;
use thiserror::Error;

use crate::status::OrderStatus;

/// Errors that can occur in the order coordinator.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The request itself is invalid (missing customer, no items, bad quantity).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A status update would move the order backward.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Insufficient stock for item {item_id} (requested: {requested})")]
    InsufficientStock { item_id: ItemId, requested: i32 },

    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// Any other failure reported by the stock component.
    #[error("Stock error: {0}")]
    Stock(StockError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl From<StockError> for OrderError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::InsufficientStock { item_id, requested } => {
                OrderError::InsufficientStock { item_id, requested }
            }
            StockError::ItemNotFound(item_id) => OrderError::ItemNotFound(item_id),
            StockError::InvalidQuantity { item_id, quantity } => {
                OrderError::Validation(format!("invalid quantity {quantity} for item {item_id}"))
            }
            other => OrderError::Stock(other),
        }
    }
}

impl OrderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrderError::NotFound(_) | OrderError::ItemNotFound(_))
    }

    pub fn is_business_rule_violation(&self) -> bool {
        match self {
            OrderError::InsufficientStock { .. } | OrderError::InvalidStatusTransition { .. } => {
                true
            }
            OrderError::Stock(e) => e.is_business_rule_violation(),
            _ => false,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            OrderError::Database(_) => true,
            OrderError::Stock(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_errors_are_mapped() {
        let err: OrderError = StockError::InsufficientStock {
            item_id: ItemId::new("1"),
            requested: 4,
        }
        .into();
        assert!(matches!(err, OrderError::InsufficientStock { requested: 4, .. }));
        assert!(err.is_business_rule_violation());

        let err: OrderError = StockError::ItemNotFound(ItemId::new("x")).into();
        assert!(err.is_not_found());

        let err: OrderError = StockError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_transition_error_display() {
        let err = OrderError::InvalidStatusTransition {
            from: OrderStatus::Ready,
            to: OrderStatus::Paid,
        };
        assert_eq!(err.to_string(), "Invalid status transition from ready to paid");
    }
}
