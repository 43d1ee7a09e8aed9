//! Backend selection from configuration.

use std::sync::Arc;

use broker::{AmqpBroker, BrokerError, EventPublisher, InMemoryBroker, MessageBroker, Topology};
use orders::{InMemoryOrderStore, OrderService, OrderStore, PostgresOrderStore};
use saga::SagaError;
use sqlx::postgres::PgPoolOptions;
use stock::{
    CachedStockStore, InMemoryItemCache, InMemoryStockStore, ItemCache, PostgresStockStore,
    RedisItemCache, StockError, StockService, StockStore, starter_catalog,
};
use thiserror::Error;

use crate::config::{BrokerBackend, CacheBackend, Config, StorageBackend};

/// Failures that stop the process from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stock backend failed: {0}")]
    Stock(#[from] StockError),

    #[error("Broker failed: {0}")]
    Broker(#[from] BrokerError),

    #[error("Saga workers failed: {0}")]
    Saga(#[from] SagaError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// The components the server and the saga workers run on.
pub struct Backends {
    pub broker: Arc<dyn MessageBroker>,
    pub orders: OrderService,
}

/// Connects the configured store, cache and broker and wires the services.
#[tracing::instrument(skip_all, fields(
    storage = ?config.storage_backend,
    cache = ?config.cache_backend,
    broker = ?config.broker_backend
))]
pub async fn build_backends(config: &Config) -> Result<Backends, StartupError> {
    let broker_settings = config.broker_settings();
    let broker: Arc<dyn MessageBroker> = match config.broker_backend {
        BrokerBackend::Amqp => {
            Arc::new(AmqpBroker::connect(&config.rabbitmq, broker_settings.clone()).await?)
        }
        BrokerBackend::Memory => {
            let broker = InMemoryBroker::with_settings(&broker_settings);
            broker
                .declare_topology(&Topology::order_saga(&broker_settings))
                .await?;
            Arc::new(broker)
        }
    };

    let cache: Arc<dyn ItemCache> = match config.cache_backend {
        CacheBackend::Redis => {
            Arc::new(RedisItemCache::connect(&config.redis_url, config.cache_settings()).await?)
        }
        CacheBackend::Memory => Arc::new(InMemoryItemCache::new(config.cache_ttl)),
    };

    let (stock_store, order_store): (Arc<dyn StockStore>, Arc<dyn OrderStore>) =
        match config.storage_backend {
            StorageBackend::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(&config.database_url)
                    .await?;
                let stock_store = PostgresStockStore::new(pool.clone());
                stock_store.run_migrations().await?;
                (
                    Arc::new(CachedStockStore::new(stock_store, cache)),
                    Arc::new(PostgresOrderStore::new(pool)),
                )
            }
            StorageBackend::Memory => (
                Arc::new(CachedStockStore::new(
                    InMemoryStockStore::with_items(starter_catalog()),
                    cache,
                )),
                Arc::new(InMemoryOrderStore::new()),
            ),
        };

    let stock = StockService::new(stock_store, config.reservation_settings());
    let publisher = EventPublisher::new(broker.clone(), &broker_settings);
    let orders = OrderService::new(order_store, stock, publisher);

    tracing::info!("Backends ready");
    Ok(Backends { broker, orders })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backends_serve_starter_catalog() {
        let backends = build_backends(&Config::default()).await.unwrap();
        let menu = backends.orders.stock().get_items(&[]).await.unwrap();
        assert_eq!(menu.len(), 2);
        assert_eq!(menu[0].name, "Burger");
        backends.broker.close().await.unwrap();
    }
}
