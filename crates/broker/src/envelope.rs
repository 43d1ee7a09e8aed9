//! Message envelope and delivery types.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::event::EventName;

/// Header carrying the number of failed processing attempts.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// A message as published to, or received from, the broker.
///
/// The retry counter is a typed field rather than an untyped header lookup; broker
/// implementations translate it to and from the [`RETRY_COUNT_HEADER`] header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    /// Exchange the message is published to. The empty string is the default exchange.
    pub exchange: String,
    /// Routing key used for the publish.
    pub routing_key: String,
    /// JSON-serialized body.
    pub payload: Vec<u8>,
    /// Number of failed processing attempts so far (absent header = 0).
    pub retry_count: u32,
    /// Opaque trace-propagation headers.
    pub trace_context: BTreeMap<String, String>,
    /// Persistent delivery mode.
    pub durable: bool,
    pub content_type: String,
}

impl MessageEnvelope {
    /// Builds a durable envelope for an event, serializing `payload` as JSON.
    ///
    /// The message is published to the event's exchange with the event name as routing key.
    pub fn for_event<T: Serialize>(
        event: EventName,
        payload: &T,
        content_type: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            exchange: event.as_str().to_string(),
            routing_key: event.as_str().to_string(),
            payload: serde_json::to_vec(payload)?,
            retry_count: 0,
            trace_context: BTreeMap::new(),
            durable: true,
            content_type: content_type.into(),
        })
    }

    /// Deserializes the JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_trace_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.trace_context.insert(key.into(), value.into());
        self
    }
}

/// A message handed to a consumer, awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Tag used to ack or reject this delivery; unique per queue.
    pub delivery_tag: u64,
    /// Queue the message was consumed from.
    pub queue: String,
    pub envelope: MessageEnvelope,
    /// True when the broker has delivered this message before.
    pub redelivered: bool,
}
