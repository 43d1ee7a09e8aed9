use std::collections::HashMap;

use async_trait::async_trait;
use common::ItemId;
use redis::aio::MultiplexedConnection;

use crate::cache::ItemCache;
use crate::error::Result;
use crate::item::Item;
use crate::settings::CacheSettings;

/// Redis-backed item cache. Items are stored as JSON under `<prefix><id>` with an expiry.
#[derive(Clone)]
pub struct RedisItemCache {
    connection: MultiplexedConnection,
    settings: CacheSettings,
}

impl RedisItemCache {
    /// Connects and verifies the server answers `PING`.
    pub async fn connect(url: &str, settings: CacheSettings) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut connection = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;

        tracing::info!(ttl_secs = settings.ttl.as_secs(), "Connected to Redis item cache");
        Ok(Self {
            connection,
            settings,
        })
    }

    fn ttl_secs(&self) -> u64 {
        self.settings.ttl.as_secs().max(1)
    }
}

#[async_trait]
impl ItemCache for RedisItemCache {
    async fn get_item(&self, id: &ItemId) -> Result<Option<Item>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(self.settings.key(id.as_str()))
            .query_async(&mut connection)
            .await?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn get_items(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Item>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| self.settings.key(id.as_str())).collect();
        let mut connection = self.connection.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut connection)
            .await?;

        let mut hits = HashMap::new();
        for json in values.into_iter().flatten() {
            match serde_json::from_str::<Item>(&json) {
                Ok(item) => {
                    hits.insert(item.id.clone(), item);
                }
                // A corrupt entry counts as a miss and gets overwritten on populate.
                Err(e) => tracing::warn!(error = %e, "Discarding undecodable cache entry"),
            }
        }
        Ok(hits)
    }

    async fn set_item(&self, item: &Item) -> Result<()> {
        let json = serde_json::to_string(item)?;
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(self.settings.key(item.id.as_str()))
            .arg(json)
            .arg("EX")
            .arg(self.ttl_secs())
            .query_async(&mut connection)
            .await?;
        Ok(())
    }

    async fn invalidate_item(&self, id: &ItemId) -> Result<()> {
        let mut connection = self.connection.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(self.settings.key(id.as_str()))
            .query_async(&mut connection)
            .await?;
        Ok(())
    }
}
