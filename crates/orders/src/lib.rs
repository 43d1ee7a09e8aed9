//! Order entity and the order saga coordinator.
//!
//! An order moves strictly forward through
//! `pending → waiting_payment → paid → preparing → ready`. [`OrderService`] creates orders
//! after checking and reserving stock, applies merge-semantics updates, and publishes
//! `order.paid`, `order.preparing` and `order.ready` when the status advances to them.

pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod service;
pub mod status;
pub mod store;

pub use error::{OrderError, Result};
pub use memory::InMemoryOrderStore;
pub use order::{Order, OrderItem, OrderPatch, StatusChange};
pub use postgres::PostgresOrderStore;
pub use service::OrderService;
pub use status::OrderStatus;
pub use store::OrderStore;
