use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::envelope::{Delivery, MessageEnvelope};
use crate::error::Result;
use crate::topology::{QueueBinding, Topology};

/// Stream of deliveries for one consumer subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery>> + Send>>;

/// Capability interface over the message broker.
///
/// Implementations must make declarations idempotent: declaring the same topology or queue
/// twice is not an error.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declares every event exchange, the dead-letter exchange and the dead-letter queues.
    async fn declare_topology(&self, topology: &Topology) -> Result<()>;

    /// Declares a consumer queue with dead-letter arguments and binds it to its exchange.
    async fn declare_queue(&self, binding: &QueueBinding) -> Result<()>;

    /// Publishes a message and waits for the broker to accept it.
    async fn publish(&self, envelope: &MessageEnvelope) -> Result<()>;

    /// Starts consuming a queue with manual acknowledgement.
    ///
    /// `consumer_tag` identifies the subscription; several subscriptions on the same queue
    /// compete for deliveries.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    /// Acknowledges a delivery, removing it from its queue.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Negatively acknowledges a delivery without requeue.
    ///
    /// The queue's dead-letter exchange, if configured, receives the message.
    async fn reject(&self, delivery: &Delivery) -> Result<()>;

    /// Closes the connection. Open delivery streams end.
    async fn close(&self) -> Result<()>;
}
