//! Saga error types.

use broker::{BrokerError, HandlerError};
use orders::OrderError;
use stock::StockError;
use thiserror::Error;

/// Errors that can occur in a saga step.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The payment provider could not create a link.
    #[error("Payment link creation failed: {0}")]
    PaymentLink(String),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Stock error: {0}")]
    Stock(#[from] StockError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl From<SagaError> for HandlerError {
    fn from(err: SagaError) -> Self {
        HandlerError::failed(err)
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
