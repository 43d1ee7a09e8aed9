//! Exchange, queue and dead-letter declarations.

use crate::event::EventName;
use crate::settings::BrokerSettings;

/// A consumer queue bound to one event exchange.
///
/// Every queue dead-letters into the settings' dead-letter exchange with the event name as
/// routing key, so a rejected message lands in that event's DLQ whichever queue it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: String,
    pub event: EventName,
}

impl QueueBinding {
    /// The queue named after the event itself.
    pub fn primary(event: EventName) -> Self {
        Self {
            queue: event.as_str().to_string(),
            event,
        }
    }

    /// A separate queue (`<event>.<group>`) for an additional subscriber group.
    ///
    /// Each queue bound to a direct exchange gets its own copy of every message, so two
    /// services reacting to the same event use two queues.
    pub fn subscriber(event: EventName, group: &str) -> Self {
        Self {
            queue: format!("{}.{}", event.as_str(), group),
            event,
        }
    }

    pub fn exchange(&self) -> &'static str {
        self.event.as_str()
    }

    pub fn routing_key(&self) -> &'static str {
        self.event.as_str()
    }

    /// Routing key used when a message from this queue is dead-lettered.
    pub fn dead_letter_routing_key(&self) -> &'static str {
        self.event.as_str()
    }
}

/// The full declaration set for the order saga.
#[derive(Debug, Clone)]
pub struct Topology {
    /// One durable direct exchange per event.
    pub event_exchanges: Vec<EventName>,
    /// The durable direct dead-letter exchange.
    pub dead_letter_exchange: String,
    /// `(dlq name, routing key)` pairs bound to the dead-letter exchange.
    pub dead_letter_queues: Vec<(String, String)>,
    /// Primary consumer queues, one per event.
    pub queues: Vec<QueueBinding>,
}

impl Topology {
    /// Builds the topology for every saga event.
    pub fn order_saga(settings: &BrokerSettings) -> Self {
        Self {
            event_exchanges: EventName::ALL.to_vec(),
            dead_letter_exchange: settings.dead_letter_exchange.clone(),
            dead_letter_queues: EventName::ALL
                .iter()
                .map(|e| (e.dead_letter_queue(), e.as_str().to_string()))
                .collect(),
            queues: EventName::ALL.into_iter().map(QueueBinding::primary).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_saga_topology() {
        let topology = Topology::order_saga(&BrokerSettings::default());

        assert_eq!(topology.event_exchanges.len(), 4);
        assert_eq!(topology.dead_letter_exchange, "dlx");
        assert!(
            topology
                .dead_letter_queues
                .contains(&("order.created.dlq".to_string(), "order.created".to_string()))
        );
        assert!(
            topology
                .queues
                .iter()
                .any(|b| b.queue == "order.preparing" && b.exchange() == "order.preparing")
        );
    }

    #[test]
    fn test_subscriber_queue_dead_letters_to_event_dlq() {
        let binding = QueueBinding::subscriber(EventName::OrderPaid, "stock");

        assert_eq!(binding.queue, "order.paid.stock");
        assert_eq!(binding.exchange(), "order.paid");
        assert_eq!(binding.dead_letter_routing_key(), "order.paid");
    }
}
