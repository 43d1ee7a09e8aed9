//! Stock reservation engine and cache-aside catalog store.
//!
//! The durable [`StockStore`] owns the item catalog and the reservation ledger. Every
//! mutation is a guarded conditional update inside one transaction, so concurrent callers
//! (in this process or in other replicas) cannot oversell.
//!
//! [`CachedStockStore`] puts an [`ItemCache`] in front of catalog reads, and
//! [`StockService`] is the operations surface used by the order coordinator and the saga
//! consumers. [`ExpirySweeper`] periodically expires stale reservations.

pub mod cache;
pub mod cached;
pub mod error;
pub mod item;
pub mod memory;
pub mod postgres;
pub mod redis_cache;
pub mod service;
pub mod settings;
pub mod store;
pub mod sweeper;

pub use cache::{InMemoryItemCache, ItemCache};
pub use cached::CachedStockStore;
pub use error::{Result, StockError};
pub use item::{Item, ItemQuantity, Reservation, ReservationId, ReservationStatus, starter_catalog};
pub use memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;
pub use redis_cache::RedisItemCache;
pub use service::{StockAvailability, StockService};
pub use settings::{CacheSettings, ReservationSettings};
pub use store::StockStore;
pub use sweeper::ExpirySweeper;
