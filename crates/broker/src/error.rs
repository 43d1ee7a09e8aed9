use thiserror::Error;

/// Errors that can occur when talking to the message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The AMQP client reported an error (connection, channel or protocol level).
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// Declaring an exchange, queue or binding failed.
    #[error("Failed to declare {object} '{name}': {reason}")]
    Topology {
        object: &'static str,
        name: String,
        reason: String,
    },

    /// The broker negatively confirmed a publish.
    #[error("Broker refused message published to exchange '{0}'")]
    PublishRefused(String),

    /// A message was published to an exchange that does not exist.
    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    /// A consumer was registered on a queue that does not exist.
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// The delivery is not (or no longer) outstanding on its queue.
    #[error("Unknown delivery tag {delivery_tag} on queue {queue}")]
    UnknownDelivery { queue: String, delivery_tag: u64 },

    /// The broker connection has been closed.
    #[error("Broker connection closed")]
    Closed,

    /// Payload serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BrokerError {
    /// Returns true for errors caused by the broker being unreachable or gone.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Amqp(_) | BrokerError::Closed)
    }
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
