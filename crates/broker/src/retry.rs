//! Retry with linear backoff and dead-lettering.

use crate::envelope::Delivery;
use crate::error::Result;
use crate::gateway::MessageBroker;
use crate::settings::BrokerSettings;

/// Outcome of [`handle_retry`] for a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// A copy carrying the incremented counter was re-published; the original delivery
    /// must be acknowledged so it is not dead-lettered as well.
    Requeued { attempt: u32 },
    /// The retry budget is exhausted; the original delivery must be rejected without requeue
    /// so the queue's dead-letter exchange routes it to the event's DLQ.
    DeadLetter { attempts: u32 },
}

impl RetryDisposition {
    pub fn is_dead_letter(&self) -> bool {
        matches!(self, RetryDisposition::DeadLetter { .. })
    }
}

/// Handles a delivery whose processing failed.
///
/// Increments the retry counter carried by the envelope. Below `max_retry_count` it sleeps
/// `attempt * backoff_unit` and re-publishes the message, marked durable, to the queue it was
/// consumed from. Otherwise it reports [`RetryDisposition::DeadLetter`].
///
/// The retry copy goes through the default exchange straight to the source queue, so other
/// subscriber queues bound to the same event exchange do not receive a duplicate.
///
/// The current delivery is left unsettled; pass the returned disposition to [`settle`].
/// The backoff sleep is not cancellable. If the process stops during it, the delivery stays
/// unacknowledged and the broker redelivers it.
#[tracing::instrument(
    skip(broker, delivery, settings),
    fields(queue = %delivery.queue, delivery_tag = delivery.delivery_tag)
)]
pub async fn handle_retry(
    broker: &dyn MessageBroker,
    delivery: &Delivery,
    settings: &BrokerSettings,
) -> Result<RetryDisposition> {
    let attempt = delivery.envelope.retry_count.saturating_add(1);

    if attempt >= settings.max_retry_count {
        tracing::error!(
            retry_count = attempt,
            max_retry_count = settings.max_retry_count,
            routing_key = %delivery.envelope.routing_key,
            "Retry budget exhausted, dead-lettering message"
        );
        return Ok(RetryDisposition::DeadLetter { attempts: attempt });
    }

    let backoff = settings.backoff_for(attempt);
    tracing::warn!(
        retry_count = attempt,
        backoff_ms = backoff.as_millis() as u64,
        "Retrying message"
    );
    tokio::time::sleep(backoff).await;

    let mut retry = delivery.envelope.clone().with_retry_count(attempt);
    retry.exchange = String::new();
    retry.routing_key = delivery.queue.clone();
    retry.durable = true;
    broker.publish(&retry).await?;

    Ok(RetryDisposition::Requeued { attempt })
}

/// Finalizes the original delivery after [`handle_retry`].
pub async fn settle(
    broker: &dyn MessageBroker,
    delivery: &Delivery,
    disposition: RetryDisposition,
) -> Result<()> {
    match disposition {
        RetryDisposition::Requeued { .. } => broker.ack(delivery).await,
        RetryDisposition::DeadLetter { .. } => broker.reject(delivery).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageEnvelope;
    use crate::event::EventName;
    use crate::memory::InMemoryBroker;
    use crate::topology::Topology;
    use futures_util::StreamExt;
    use std::time::Duration;

    fn fast_settings() -> BrokerSettings {
        BrokerSettings::default().with_backoff_unit(Duration::ZERO)
    }

    async fn setup() -> InMemoryBroker {
        let broker = InMemoryBroker::new();
        broker
            .declare_topology(&Topology::order_saga(&fast_settings()))
            .await
            .unwrap();
        broker
    }

    async fn deliver(broker: &InMemoryBroker, retry_count: u32) -> Delivery {
        let envelope = MessageEnvelope::for_event(
            EventName::OrderCreated,
            &serde_json::json!({"id": "o-1"}),
            "application/json",
        )
        .unwrap()
        .with_retry_count(retry_count);
        broker.publish(&envelope).await.unwrap();

        let mut stream = broker.consume("order.created", "test").await.unwrap();
        stream.next().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_first_failure_requeues_with_incremented_counter() {
        let broker = setup().await;
        let delivery = deliver(&broker, 0).await;

        let disposition = handle_retry(&broker, &delivery, &fast_settings())
            .await
            .unwrap();

        assert_eq!(disposition, RetryDisposition::Requeued { attempt: 1 });
        let waiting = broker.drain("order.created").await;
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].retry_count, 1);
        assert!(waiting[0].durable);
        // The original is still outstanding until settled.
        assert_eq!(broker.unacked_count("order.created").await, 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_dead_letters() {
        let broker = setup().await;
        let delivery = deliver(&broker, 2).await;

        let disposition = handle_retry(&broker, &delivery, &fast_settings())
            .await
            .unwrap();
        assert_eq!(disposition, RetryDisposition::DeadLetter { attempts: 3 });
        assert_eq!(broker.queue_depth("order.created").await, 0);

        settle(&broker, &delivery, disposition).await.unwrap();
        assert_eq!(broker.queue_depth("order.created.dlq").await, 1);
        assert_eq!(broker.unacked_count("order.created").await, 0);
    }

    #[tokio::test]
    async fn test_settle_requeued_acks_original() {
        let broker = setup().await;
        let delivery = deliver(&broker, 0).await;

        let disposition = handle_retry(&broker, &delivery, &fast_settings())
            .await
            .unwrap();
        settle(&broker, &delivery, disposition).await.unwrap();

        assert_eq!(broker.unacked_count("order.created").await, 0);
        assert_eq!(broker.queue_depth("order.created").await, 1);
        assert_eq!(broker.queue_depth("order.created.dlq").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_linear_in_attempt() {
        let broker = setup().await;
        let settings = BrokerSettings::default();
        let delivery = deliver(&broker, 1).await;

        let started = tokio::time::Instant::now();
        handle_retry(&broker, &delivery, &settings).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
