//! Per-queue worker loop with manual acknowledgement.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::envelope::{Delivery, MessageEnvelope};
use crate::error::Result;
use crate::gateway::{DeliveryStream, MessageBroker};
use crate::retry::{handle_retry, settle};
use crate::settings::BrokerSettings;
use crate::topology::QueueBinding;

/// Why a handler could not process a message.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The body could not be deserialized. Redelivery will not fix it, but it still goes
    /// through the retry path so it ends up in the DLQ.
    #[error("Malformed message body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Processing failed: {0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(error: impl std::fmt::Display) -> Self {
        HandlerError::Failed(error.to_string())
    }
}

/// Business logic run for each delivery on a queue.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, envelope: &MessageEnvelope) -> std::result::Result<(), HandlerError>;
}

/// Long-running subscription to one queue.
///
/// Processes one message at a time: acknowledges on success, and on failure runs
/// [`handle_retry`] followed by [`settle`]. A failing message never stops the loop.
pub struct Consumer {
    broker: Arc<dyn MessageBroker>,
    binding: QueueBinding,
    handler: Arc<dyn MessageHandler>,
    settings: BrokerSettings,
    consumer_tag: String,
}

impl Consumer {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        binding: QueueBinding,
        handler: Arc<dyn MessageHandler>,
        settings: BrokerSettings,
    ) -> Self {
        let consumer_tag = format!("{}-consumer", binding.queue);
        Self {
            broker,
            binding,
            handler,
            settings,
            consumer_tag,
        }
    }

    /// Overrides the consumer tag, needed when several consumers share one queue.
    pub fn with_consumer_tag(mut self, consumer_tag: impl Into<String>) -> Self {
        self.consumer_tag = consumer_tag.into();
        self
    }

    pub fn queue(&self) -> &str {
        &self.binding.queue
    }

    /// Declares the queue, subscribes and spawns the worker loop.
    ///
    /// The loop ends when `shutdown` turns true (or its sender is dropped) or when the
    /// delivery stream ends. A message being processed is finished first.
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        self.broker.declare_queue(&self.binding).await?;
        let stream = self
            .broker
            .consume(&self.binding.queue, &self.consumer_tag)
            .await?;

        tracing::info!(queue = %self.binding.queue, consumer_tag = %self.consumer_tag, "Consumer started");
        Ok(tokio::spawn(self.run(stream, shutdown)))
    }

    async fn run(self, mut stream: DeliveryStream, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                next = stream.next() => match next {
                    Some(Ok(delivery)) => self.process(&delivery).await,
                    Some(Err(e)) => {
                        tracing::error!(queue = %self.binding.queue, error = %e, "Delivery stream failed");
                        break;
                    }
                    None => {
                        tracing::warn!(queue = %self.binding.queue, "Delivery stream ended");
                        break;
                    }
                },
            }
        }
        tracing::info!(queue = %self.binding.queue, "Consumer stopped");
    }

    #[tracing::instrument(
        skip(self, delivery),
        fields(queue = %delivery.queue, delivery_tag = delivery.delivery_tag, retry_count = delivery.envelope.retry_count)
    )]
    async fn process(&self, delivery: &Delivery) {
        let broker = self.broker.as_ref();

        let error = match self.handler.handle(&delivery.envelope).await {
            Ok(()) => {
                if let Err(e) = broker.ack(delivery).await {
                    tracing::error!(error = %e, "Failed to acknowledge message");
                }
                return;
            }
            Err(error) => error,
        };

        tracing::warn!(error = %error, "Message processing failed");
        let settled = match handle_retry(broker, delivery, &self.settings).await {
            Ok(disposition) => settle(broker, delivery, disposition).await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to re-publish message, rejecting");
                broker.reject(delivery).await
            }
        };
        if let Err(e) = settled {
            tracing::error!(error = %e, "Failed to settle message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventName;
    use crate::memory::InMemoryBroker;
    use crate::topology::Topology;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Counting {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MessageHandler for Counting {
        async fn handle(&self, envelope: &MessageEnvelope) -> std::result::Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _: serde_json::Value = envelope.decode()?;
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_consumer_acks_and_stops_on_shutdown() {
        let broker = Arc::new(InMemoryBroker::new());
        broker
            .declare_topology(&Topology::order_saga(&BrokerSettings::default()))
            .await
            .unwrap();
        let handler = Arc::new(Counting {
            calls: AtomicU32::new(0),
        });
        let (tx, rx) = watch::channel(false);

        let consumer = Consumer::new(
            broker.clone(),
            QueueBinding::primary(EventName::OrderReady),
            handler.clone(),
            BrokerSettings::default(),
        );
        let handle = consumer.start(rx).await.unwrap();

        let envelope =
            MessageEnvelope::for_event(EventName::OrderReady, &serde_json::json!({}), "application/json")
                .unwrap();
        broker.publish(&envelope).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while handler.calls.load(Ordering::SeqCst) == 0 || broker.unacked_count("order.ready").await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(broker.queue_depth("order.ready").await, 0);
    }
}
