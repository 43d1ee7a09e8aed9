//! End-to-end retry and dead-letter behavior through the consumer loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use broker::{
    BrokerSettings, Consumer, EventName, HandlerError, InMemoryBroker, MessageBroker,
    MessageEnvelope, MessageHandler, QueueBinding, Topology,
};
use tokio::sync::watch;

/// Fails the first `failures` calls, then succeeds.
struct Flaky {
    failures: u32,
    calls: AtomicU32,
}

impl Flaky {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for Flaky {
    async fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        let _: serde_json::Value = envelope.decode()?;
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(HandlerError::failed(format!("attempt {call} failed")));
        }
        Ok(())
    }
}

fn settings() -> BrokerSettings {
    BrokerSettings::default().with_backoff_unit(Duration::ZERO)
}

async fn broker() -> Arc<InMemoryBroker> {
    let broker = Arc::new(InMemoryBroker::new());
    broker
        .declare_topology(&Topology::order_saga(&settings()))
        .await
        .unwrap();
    broker
}

fn order_created() -> MessageEnvelope {
    MessageEnvelope::for_event(
        EventName::OrderCreated,
        &serde_json::json!({"id": "order-1", "status": "pending"}),
        "application/json",
    )
    .unwrap()
}

async fn wait_until_idle(broker: &InMemoryBroker, queue: &str, done: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if done() && broker.queue_depth(queue).await == 0 && broker.unacked_count(queue).await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("consumer did not settle in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn message_failing_three_times_lands_once_in_dlq() {
    let broker = broker().await;
    let handler = Flaky::new(u32::MAX);
    let (tx, rx) = watch::channel(false);
    let handle = Consumer::new(
        broker.clone(),
        QueueBinding::primary(EventName::OrderCreated),
        handler.clone(),
        settings(),
    )
    .start(rx)
    .await
    .unwrap();

    broker.publish(&order_created()).await.unwrap();

    let h = handler.clone();
    wait_until_idle(&broker, "order.created", move || h.calls() >= 3).await;
    // Give a stray extra attempt a chance to show up before asserting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handler.calls(), 3);
    let dead = broker.drain("order.created.dlq").await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].retry_count, 2);
    assert_eq!(broker.queue_depth("order.created").await, 0);

    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn message_failing_twice_then_succeeding_is_acknowledged() {
    let broker = broker().await;
    let handler = Flaky::new(2);
    let (tx, rx) = watch::channel(false);
    let handle = Consumer::new(
        broker.clone(),
        QueueBinding::primary(EventName::OrderCreated),
        handler.clone(),
        settings(),
    )
    .start(rx)
    .await
    .unwrap();

    broker.publish(&order_created()).await.unwrap();

    let h = handler.clone();
    wait_until_idle(&broker, "order.created", move || h.calls() >= 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handler.calls(), 3);
    assert_eq!(broker.queue_depth("order.created.dlq").await, 0);
    assert_eq!(broker.queue_depth("order.created").await, 0);

    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_body_is_dead_lettered_after_retries() {
    let broker = broker().await;
    let handler = Flaky::new(0);
    let (tx, rx) = watch::channel(false);
    let handle = Consumer::new(
        broker.clone(),
        QueueBinding::primary(EventName::OrderCreated),
        handler.clone(),
        settings(),
    )
    .start(rx)
    .await
    .unwrap();

    let mut envelope = order_created();
    envelope.payload = b"not json".to_vec();
    broker.publish(&envelope).await.unwrap();

    let b = broker.clone();
    tokio::time::timeout(Duration::from_secs(5), async move {
        while b.queue_depth("order.created.dlq").await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // The handler never got past decoding.
    assert_eq!(handler.calls(), 0);
    assert_eq!(broker.queue_depth("order.created.dlq").await, 1);

    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retries_on_subscriber_queue_do_not_reach_other_subscribers() {
    let broker = broker().await;
    let subscriber = QueueBinding::subscriber(EventName::OrderCreated, "audit");
    let handler = Flaky::new(1);
    let (tx, rx) = watch::channel(false);
    let handle = Consumer::new(broker.clone(), subscriber, handler.clone(), settings())
        .start(rx)
        .await
        .unwrap();

    broker.publish(&order_created()).await.unwrap();

    let h = handler.clone();
    wait_until_idle(&broker, "order.created.audit", move || h.calls() >= 2).await;

    // The primary queue got the original publish only.
    assert_eq!(broker.queue_depth("order.created").await, 1);
    assert_eq!(broker.queue_depth("order.created.dlq").await, 0);

    tx.send(true).unwrap();
    handle.await.unwrap();
}
