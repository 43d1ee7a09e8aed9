use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::envelope::{Delivery, MessageEnvelope};
use crate::error::{BrokerError, Result};
use crate::gateway::{DeliveryStream, MessageBroker};
use crate::settings::BrokerSettings;
use crate::topology::{QueueBinding, Topology};

#[derive(Default)]
struct Exchange {
    /// `(routing key, queue)` bindings.
    bindings: Vec<(String, String)>,
}

struct Queue {
    ready: VecDeque<MessageEnvelope>,
    unacked: HashMap<u64, MessageEnvelope>,
    dead_letter_exchange: Option<String>,
    dead_letter_routing_key: Option<String>,
}

impl Queue {
    fn new(dead_letter: Option<(String, String)>) -> Self {
        let (dead_letter_exchange, dead_letter_routing_key) = match dead_letter {
            Some((exchange, routing_key)) => (Some(exchange), Some(routing_key)),
            None => (None, None),
        };
        Self {
            ready: VecDeque::new(),
            unacked: HashMap::new(),
            dead_letter_exchange,
            dead_letter_routing_key,
        }
    }
}

#[derive(Default)]
struct State {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, Queue>,
    next_delivery_tag: u64,
    closed: bool,
}

impl State {
    fn bind(&mut self, exchange: &str, routing_key: &str, queue: &str) {
        let exchange = self.exchanges.entry(exchange.to_string()).or_default();
        let binding = (routing_key.to_string(), queue.to_string());
        if !exchange.bindings.contains(&binding) {
            exchange.bindings.push(binding);
        }
    }

    fn enqueue(&mut self, queue: &str, envelope: MessageEnvelope) {
        if let Some(q) = self.queues.get_mut(queue) {
            q.ready.push_back(envelope);
        }
    }

    /// Routes a message the way a direct exchange does. The empty exchange name is the
    /// default exchange, which delivers straight to the queue named by the routing key.
    fn route(&mut self, envelope: MessageEnvelope) -> Result<()> {
        if envelope.exchange.is_empty() {
            let queue = envelope.routing_key.clone();
            self.enqueue(&queue, envelope);
            return Ok(());
        }

        let targets: Vec<String> = self
            .exchanges
            .get(&envelope.exchange)
            .ok_or_else(|| BrokerError::ExchangeNotFound(envelope.exchange.clone()))?
            .bindings
            .iter()
            .filter(|(routing_key, _)| *routing_key == envelope.routing_key)
            .map(|(_, queue)| queue.clone())
            .collect();

        for queue in targets {
            self.enqueue(&queue, envelope.clone());
        }
        Ok(())
    }

    fn take(&mut self, queue: &str) -> Result<Option<Delivery>> {
        let q = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        let Some(envelope) = q.ready.pop_front() else {
            return Ok(None);
        };
        self.next_delivery_tag += 1;
        let delivery_tag = self.next_delivery_tag;
        q.unacked.insert(delivery_tag, envelope.clone());

        Ok(Some(Delivery {
            delivery_tag,
            queue: queue.to_string(),
            envelope,
            redelivered: false,
        }))
    }

    fn settle(&mut self, delivery: &Delivery) -> Result<(MessageEnvelope, Option<(String, String)>)> {
        let unknown = || BrokerError::UnknownDelivery {
            queue: delivery.queue.clone(),
            delivery_tag: delivery.delivery_tag,
        };
        let q = self.queues.get_mut(&delivery.queue).ok_or_else(unknown)?;
        let envelope = q.unacked.remove(&delivery.delivery_tag).ok_or_else(unknown)?;
        let dead_letter = q.dead_letter_exchange.clone().map(|exchange| {
            let routing_key = q
                .dead_letter_routing_key
                .clone()
                .unwrap_or_else(|| envelope.routing_key.clone());
            (exchange, routing_key)
        });
        Ok((envelope, dead_letter))
    }
}

/// In-process broker with direct-exchange routing, manual acknowledgement and
/// dead-lettering on reject.
///
/// Used by tests and by the `memory` broker backend. Messages live only as long as the
/// broker does.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
    /// Woken after every publish, reject and close.
    changed: Arc<Notify>,
    dead_letter_exchange: String,
}

impl InMemoryBroker {
    /// Creates a broker with no exchanges or queues, using the default settings.
    pub fn new() -> Self {
        Self::with_settings(&BrokerSettings::default())
    }

    /// Creates a broker whose consumer queues dead-letter into `settings.dead_letter_exchange`.
    pub fn with_settings(settings: &BrokerSettings) -> Self {
        Self {
            state: Arc::default(),
            changed: Arc::default(),
            dead_letter_exchange: settings.dead_letter_exchange.clone(),
        }
    }

    /// Number of messages waiting for a consumer on `queue`.
    pub async fn queue_depth(&self, queue: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(queue)
            .map_or(0, |q| q.ready.len())
    }

    /// Number of delivered but not yet settled messages on `queue`.
    pub async fn unacked_count(&self, queue: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(queue)
            .map_or(0, |q| q.unacked.len())
    }

    /// Removes and returns every waiting message on `queue`.
    pub async fn drain(&self, queue: &str) -> Vec<MessageEnvelope> {
        self.state
            .lock()
            .await
            .queues
            .get_mut(queue)
            .map(|q| q.ready.drain(..).collect())
            .unwrap_or_default()
    }

    async fn next_delivery(
        state: Arc<Mutex<State>>,
        changed: Arc<Notify>,
        queue: String,
    ) -> Option<Result<Delivery>> {
        loop {
            let notified = changed.notified();
            tokio::pin!(notified);
            // Register before inspecting the queue so a publish in between is not missed.
            notified.as_mut().enable();

            {
                let mut guard = state.lock().await;
                if guard.closed {
                    return None;
                }
                match guard.take(&queue) {
                    Ok(Some(delivery)) => return Some(Ok(delivery)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(e)),
                }
            }

            notified.await;
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_topology(&self, topology: &Topology) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }

        for event in &topology.event_exchanges {
            state.exchanges.entry(event.as_str().to_string()).or_default();
        }
        state
            .exchanges
            .entry(topology.dead_letter_exchange.clone())
            .or_default();

        for (queue, routing_key) in &topology.dead_letter_queues {
            state
                .queues
                .entry(queue.clone())
                .or_insert_with(|| Queue::new(None));
            let dlx = topology.dead_letter_exchange.clone();
            state.bind(&dlx, routing_key, queue);
        }
        drop(state);

        for binding in &topology.queues {
            self.declare_queue_with_dlx(binding, &topology.dead_letter_exchange)
                .await?;
        }
        Ok(())
    }

    async fn declare_queue(&self, binding: &QueueBinding) -> Result<()> {
        self.declare_queue_with_dlx(binding, &self.dead_letter_exchange)
            .await
    }

    async fn publish(&self, envelope: &MessageEnvelope) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        state.route(envelope.clone())?;
        drop(state);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        {
            let state = self.state.lock().await;
            if state.closed {
                return Err(BrokerError::Closed);
            }
            if !state.queues.contains_key(queue) {
                return Err(BrokerError::QueueNotFound(queue.to_string()));
            }
        }
        tracing::debug!(queue, consumer_tag, "Consumer registered");

        let stream = futures_util::stream::unfold(
            (self.state.clone(), self.changed.clone(), queue.to_string()),
            |(state, changed, queue)| async move {
                let next = Self::next_delivery(state.clone(), changed.clone(), queue.clone()).await?;
                Some((next, (state, changed, queue)))
            },
        );
        Ok(Box::pin(stream))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.lock().await;
        state.settle(delivery)?;
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.lock().await;
        let (mut envelope, dead_letter) = state.settle(delivery)?;
        let Some((exchange, routing_key)) = dead_letter else {
            return Ok(());
        };
        if !state.exchanges.contains_key(&exchange) {
            // Matches the broker: dead-lettering to a missing exchange drops the message.
            tracing::warn!(queue = %delivery.queue, exchange, "Dead-letter exchange missing, message dropped");
            return Ok(());
        }
        envelope.exchange = exchange;
        envelope.routing_key = routing_key;
        state.route(envelope)?;
        drop(state);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().await.closed = true;
        self.changed.notify_waiters();
        Ok(())
    }
}

impl InMemoryBroker {
    async fn declare_queue_with_dlx(&self, binding: &QueueBinding, dlx: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        state
            .queues
            .entry(binding.queue.clone())
            .or_insert_with(|| {
                Queue::new(Some((
                    dlx.to_string(),
                    binding.dead_letter_routing_key().to_string(),
                )))
            });
        state.bind(binding.exchange(), binding.routing_key(), &binding.queue);
        Ok(())
    }
}
