//! Identifiers shared by every service taking part in the order-fulfillment saga.

pub mod types;

pub use types::{CustomerId, ItemId, OrderId};
