//! RabbitMQ implementation of [`MessageBroker`] on top of `lapin`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};

use crate::envelope::{Delivery, MessageEnvelope, RETRY_COUNT_HEADER};
use crate::error::{BrokerError, Result};
use crate::gateway::{DeliveryStream, MessageBroker};
use crate::settings::{AmqpCredentials, BrokerSettings};
use crate::topology::{QueueBinding, Topology};

const PERSISTENT: u8 = 2;

/// Broker gateway backed by a RabbitMQ connection.
///
/// Publishing goes through a channel in confirm mode; consumers share a second channel with
/// a prefetch of one so each subscription handles one message at a time.
pub struct AmqpBroker {
    connection: Connection,
    publish_channel: Channel,
    consume_channel: Channel,
    settings: BrokerSettings,
}

impl AmqpBroker {
    /// Connects to the broker and declares the saga topology.
    ///
    /// A declaration failure closes the connection and is returned to the caller;
    /// startup should not proceed without the topology.
    #[tracing::instrument(skip(credentials, settings), fields(host = %credentials.host, port = credentials.port))]
    pub async fn connect(credentials: &AmqpCredentials, settings: BrokerSettings) -> Result<Self> {
        let connection =
            Connection::connect(&credentials.uri(), ConnectionProperties::default()).await?;

        let publish_channel = connection.create_channel().await?;
        publish_channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        let consume_channel = connection.create_channel().await?;
        consume_channel
            .basic_qos(1, BasicQosOptions::default())
            .await?;

        let broker = Self {
            connection,
            publish_channel,
            consume_channel,
            settings,
        };

        let topology = Topology::order_saga(&broker.settings);
        if let Err(e) = broker.declare_topology(&topology).await {
            tracing::error!(error = %e, "Failed to declare broker topology");
            if let Err(close_err) = broker.close().await {
                tracing::warn!(error = %close_err, "Failed to close broker connection");
            }
            return Err(e);
        }

        tracing::info!("Connected to message broker");
        Ok(broker)
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    async fn declare_exchange(&self, name: &str) -> Result<()> {
        self.publish_channel
            .exchange_declare(
                name,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| topology_error("exchange", name, e))
    }

    async fn declare_durable_queue(&self, name: &str, arguments: FieldTable) -> Result<()> {
        self.publish_channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                arguments,
            )
            .await
            .map(|_| ())
            .map_err(|e| topology_error("queue", name, e))
    }

    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.publish_channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| topology_error("binding", queue, e))
    }
}

#[async_trait]
impl MessageBroker for AmqpBroker {
    async fn declare_topology(&self, topology: &Topology) -> Result<()> {
        for event in &topology.event_exchanges {
            self.declare_exchange(event.as_str()).await?;
        }

        self.declare_exchange(&topology.dead_letter_exchange).await?;
        for (queue, routing_key) in &topology.dead_letter_queues {
            self.declare_durable_queue(queue, FieldTable::default())
                .await?;
            self.bind(queue, &topology.dead_letter_exchange, routing_key)
                .await?;
        }

        for binding in &topology.queues {
            self.declare_queue(binding).await?;
        }

        tracing::debug!(
            exchanges = topology.event_exchanges.len(),
            dead_letter_queues = topology.dead_letter_queues.len(),
            "Topology declared"
        );
        Ok(())
    }

    async fn declare_queue(&self, binding: &QueueBinding) -> Result<()> {
        self.declare_exchange(binding.exchange()).await?;

        let mut arguments = FieldTable::default();
        arguments.insert(
            ShortString::from("x-dead-letter-exchange"),
            AMQPValue::LongString(LongString::from(self.settings.dead_letter_exchange.clone())),
        );
        arguments.insert(
            ShortString::from("x-dead-letter-routing-key"),
            AMQPValue::LongString(LongString::from(binding.dead_letter_routing_key())),
        );
        self.declare_durable_queue(&binding.queue, arguments).await?;
        self.bind(&binding.queue, binding.exchange(), binding.routing_key())
            .await
    }

    async fn publish(&self, envelope: &MessageEnvelope) -> Result<()> {
        let mut properties = BasicProperties::default()
            .with_content_type(ShortString::from(envelope.content_type.clone()))
            .with_headers(encode_headers(envelope));
        if envelope.durable {
            properties = properties.with_delivery_mode(PERSISTENT);
        }

        let confirmation = self
            .publish_channel
            .basic_publish(
                &envelope.exchange,
                &envelope.routing_key,
                BasicPublishOptions::default(),
                &envelope.payload,
                properties,
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(BrokerError::PublishRefused(envelope.exchange.clone()));
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let consumer = self
            .consume_channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let queue = queue.to_string();
        let stream = consumer.map(move |delivery| -> Result<Delivery> {
            let delivery = delivery?;
            Ok(Delivery {
                delivery_tag: delivery.delivery_tag,
                queue: queue.clone(),
                envelope: decode_envelope(&delivery),
                redelivered: delivery.redelivered,
            })
        });
        Ok(Box::pin(stream))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.consume_channel
            .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery) -> Result<()> {
        self.consume_channel
            .basic_nack(
                delivery.delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue: false,
                },
            )
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connection.close(200, "shutdown").await?;
        Ok(())
    }
}

fn topology_error(object: &'static str, name: &str, error: lapin::Error) -> BrokerError {
    BrokerError::Topology {
        object,
        name: name.to_string(),
        reason: error.to_string(),
    }
}

fn encode_headers(envelope: &MessageEnvelope) -> FieldTable {
    let mut headers = FieldTable::default();
    for (key, value) in &envelope.trace_context {
        headers.insert(
            ShortString::from(key.clone()),
            AMQPValue::LongString(LongString::from(value.clone())),
        );
    }
    if envelope.retry_count > 0 {
        headers.insert(
            ShortString::from(RETRY_COUNT_HEADER),
            AMQPValue::LongLongInt(i64::from(envelope.retry_count)),
        );
    }
    headers
}

fn decode_envelope(delivery: &lapin::message::Delivery) -> MessageEnvelope {
    let properties = &delivery.properties;
    let mut retry_count = 0;
    let mut trace_context = BTreeMap::new();

    if let Some(headers) = properties.headers() {
        for (key, value) in headers.inner() {
            if key.as_str() == RETRY_COUNT_HEADER {
                retry_count = header_as_u32(value);
            } else if let AMQPValue::LongString(s) = value {
                trace_context.insert(
                    key.as_str().to_string(),
                    String::from_utf8_lossy(s.as_bytes()).into_owned(),
                );
            }
        }
    }

    MessageEnvelope {
        exchange: delivery.exchange.as_str().to_string(),
        routing_key: delivery.routing_key.as_str().to_string(),
        payload: delivery.data.clone(),
        retry_count,
        trace_context,
        durable: properties.delivery_mode().is_some_and(|mode| mode == PERSISTENT),
        content_type: properties
            .content_type()
            .as_ref()
            .map(|ct| ct.as_str().to_string())
            .unwrap_or_default(),
    }
}

/// Reads the retry counter whatever integer width the producer used.
fn header_as_u32(value: &AMQPValue) -> u32 {
    let raw: i64 = match value {
        AMQPValue::ShortShortInt(v) => i64::from(*v),
        AMQPValue::ShortShortUInt(v) => i64::from(*v),
        AMQPValue::ShortInt(v) => i64::from(*v),
        AMQPValue::ShortUInt(v) => i64::from(*v),
        AMQPValue::LongInt(v) => i64::from(*v),
        AMQPValue::LongUInt(v) => i64::from(*v),
        AMQPValue::LongLongInt(v) => *v,
        _ => 0,
    };
    u32::try_from(raw).unwrap_or(0)
}
