use common::{ItemId, OrderId};
use thiserror::Error;

/// Errors that can occur in the stock reservation engine.
#[derive(Debug, Error)]
pub enum StockError {
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// The guarded update found fewer than `requested` units available.
    #[error("Insufficient stock for item {item_id} (requested: {requested})")]
    InsufficientStock { item_id: ItemId, requested: i32 },

    #[error("Invalid quantity {quantity} for item {item_id}")]
    InvalidQuantity { item_id: ItemId, quantity: i32 },

    /// There are no `reserved` rows for the order: it was never reserved, or it was
    /// already confirmed, released or expired.
    #[error("No active reservation for order {0}")]
    NoActiveReservation(OrderId),

    /// An item's counters no longer cover a reservation row.
    #[error("Reservation mismatch for item {item_id} of order {order_id}")]
    ReservationMismatch { order_id: OrderId, item_id: ItemId },

    /// A stored value could not be mapped back to the domain.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StockError {
    /// Business rules that may resolve on their own, e.g. after a concurrent release.
    pub fn is_business_rule_violation(&self) -> bool {
        matches!(
            self,
            StockError::InsufficientStock { .. } | StockError::ReservationMismatch { .. }
        )
    }

    /// Saga inconsistencies that need manual investigation once retries are exhausted.
    pub fn is_consistency_anomaly(&self) -> bool {
        matches!(self, StockError::NoActiveReservation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StockError::ItemNotFound(_))
    }

    /// Errors caused by an unreachable backing service.
    pub fn is_transient(&self) -> bool {
        matches!(self, StockError::Database(_) | StockError::Cache(_))
    }
}

/// Result type for stock operations.
pub type Result<T> = std::result::Result<T, StockError>;
