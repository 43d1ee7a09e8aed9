//! Saga event names.

use serde::{Deserialize, Serialize};

/// The events exchanged between services during order fulfillment.
///
/// Each event has its own durable direct exchange, a primary queue of the same
/// name and a dead-letter queue `<event>.dlq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.paid")]
    OrderPaid,
    #[serde(rename = "order.preparing")]
    OrderPreparing,
    #[serde(rename = "order.ready")]
    OrderReady,
}

impl EventName {
    /// Every event, in lifecycle order.
    pub const ALL: [EventName; 4] = [
        EventName::OrderCreated,
        EventName::OrderPaid,
        EventName::OrderPreparing,
        EventName::OrderReady,
    ];

    /// Returns the wire name, which is also the exchange and primary queue name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::OrderCreated => "order.created",
            EventName::OrderPaid => "order.paid",
            EventName::OrderPreparing => "order.preparing",
            EventName::OrderReady => "order.ready",
        }
    }

    /// Name of the dead-letter queue for this event.
    pub fn dead_letter_queue(&self) -> String {
        format!("{}.dlq", self.as_str())
    }

    /// Looks up an event by its wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(EventName::OrderCreated.as_str(), "order.created");
        assert_eq!(EventName::OrderPaid.as_str(), "order.paid");
        assert_eq!(EventName::OrderPreparing.as_str(), "order.preparing");
        assert_eq!(EventName::OrderReady.as_str(), "order.ready");
    }

    #[test]
    fn test_dead_letter_queue_names() {
        assert_eq!(EventName::OrderCreated.dead_letter_queue(), "order.created.dlq");
        assert_eq!(EventName::OrderReady.dead_letter_queue(), "order.ready.dlq");
    }

    #[test]
    fn test_parse() {
        for event in EventName::ALL {
            assert_eq!(EventName::parse(event.as_str()), Some(event));
        }
        assert_eq!(EventName::parse("order.cancelled"), None);
    }

    #[test]
    fn test_serialization_uses_wire_name() {
        let json = serde_json::to_string(&EventName::OrderPaid).unwrap();
        assert_eq!(json, "\"order.paid\"");
    }
}
