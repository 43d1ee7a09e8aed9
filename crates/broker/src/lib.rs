//! Message broker gateway for the order-fulfillment saga.
//!
//! This crate owns everything the services need from the broker:
//! - the exchange / dead-letter topology (one direct exchange and one DLQ per event)
//! - the [`MessageEnvelope`] with a typed retry counter
//! - [`handle_retry`] with linear backoff and dead-lettering after the retry budget
//! - the per-queue [`Consumer`] loop with manual acknowledgement
//!
//! Two [`MessageBroker`] implementations are provided: [`AmqpBroker`] backed by RabbitMQ
//! and [`InMemoryBroker`] which reproduces the same routing rules in-process.

pub mod amqp;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod event;
pub mod gateway;
pub mod memory;
pub mod publisher;
pub mod retry;
pub mod settings;
pub mod topology;

pub use amqp::AmqpBroker;
pub use consumer::{Consumer, HandlerError, MessageHandler};
pub use envelope::{Delivery, MessageEnvelope, RETRY_COUNT_HEADER};
pub use error::{BrokerError, Result};
pub use event::EventName;
pub use gateway::{DeliveryStream, MessageBroker};
pub use memory::InMemoryBroker;
pub use publisher::EventPublisher;
pub use retry::{RetryDisposition, handle_retry, settle};
pub use settings::{AmqpCredentials, BrokerSettings};
pub use topology::{QueueBinding, Topology};
