use std::sync::Arc;

use serde::Serialize;

use crate::envelope::MessageEnvelope;
use crate::error::Result;
use crate::event::EventName;
use crate::gateway::MessageBroker;
use crate::settings::BrokerSettings;

/// Publishes saga events as durable JSON messages.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn MessageBroker>,
    content_type: String,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, settings: &BrokerSettings) -> Self {
        Self {
            broker,
            content_type: settings.content_type.clone(),
        }
    }

    /// Serializes `payload` and publishes it to the event's exchange.
    #[tracing::instrument(skip(self, payload), fields(event = %event))]
    pub async fn publish<T: Serialize + Sync>(&self, event: EventName, payload: &T) -> Result<()> {
        let envelope = MessageEnvelope::for_event(event, payload, self.content_type.as_str())?;
        self.broker.publish(&envelope).await?;
        tracing::debug!("Event published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBroker;
    use crate::topology::Topology;

    #[tokio::test]
    async fn test_publish_serializes_payload() {
        let broker = Arc::new(InMemoryBroker::new());
        let settings = BrokerSettings::default();
        broker
            .declare_topology(&Topology::order_saga(&settings))
            .await
            .unwrap();
        let publisher = EventPublisher::new(broker.clone(), &settings);

        publisher
            .publish(EventName::OrderPreparing, &serde_json::json!({"status": "preparing"}))
            .await
            .unwrap();

        let messages = broker.drain("order.preparing").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content_type, "application/json");
        let body: serde_json::Value = messages[0].decode().unwrap();
        assert_eq!(body["status"], "preparing");
    }
}
