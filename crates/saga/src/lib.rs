//! Event-driven steps of the order-fulfillment saga.
//!
//! Each step is a [`broker::MessageHandler`] running on its own queue:
//! 1. `order.created` → create a payment link → order moves to `waiting_payment`
//! 2. `order.paid` (queue `order.paid.stock`) → confirm the stock reservation
//! 3. `order.paid` → the kitchen starts preparing the order
//!
//! [`SagaWorkers`] runs the consumers and the reservation expiry sweeper and stops them
//! together. There is no compensation: a step that keeps failing ends in its event's DLQ.

pub mod error;
pub mod handlers;
pub mod payment;
pub mod workers;

pub use error::{Result, SagaError};
pub use handlers::{KitchenHandler, PaymentLinkHandler, StockConfirmationHandler};
pub use payment::{HostedCheckoutLinks, PaymentLinkCreator};
pub use workers::SagaWorkers;
