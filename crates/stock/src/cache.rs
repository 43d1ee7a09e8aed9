//! Item cache abstraction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::ItemId;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::Result;
use crate::item::Item;

/// Look-aside cache for catalog items.
///
/// The cache carries no correctness weight: any entry may be dropped at any time.
#[async_trait]
pub trait ItemCache: Send + Sync {
    /// Returns the cached item, or `None` on a miss.
    async fn get_item(&self, id: &ItemId) -> Result<Option<Item>>;

    /// Batch lookup. Only hits are present in the returned map.
    async fn get_items(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Item>>;

    async fn set_item(&self, item: &Item) -> Result<()>;

    async fn invalidate_item(&self, id: &ItemId) -> Result<()>;
}

/// In-process item cache with a fixed time-to-live.
#[derive(Clone)]
pub struct InMemoryItemCache {
    entries: Arc<RwLock<HashMap<ItemId, (Item, Instant)>>>,
    ttl: Duration,
}

impl InMemoryItemCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::default(),
            ttl,
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ItemCache for InMemoryItemCache {
    async fn get_item(&self, id: &ItemId) -> Result<Option<Item>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(id)
            .filter(|(_, expires)| *expires > now)
            .map(|(item, _)| item.clone()))
    }

    async fn get_items(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Item>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| entries.get(id))
            .filter(|(_, expires)| *expires > now)
            .map(|(item, _)| (item.id.clone(), item.clone()))
            .collect())
    }

    async fn set_item(&self, item: &Item) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(item.id.clone(), (item.clone(), now + self.ttl));
        Ok(())
    }

    async fn invalidate_item(&self, id: &ItemId) -> Result<()> {
        self.entries.write().await.remove(id);
        Ok(())
    }
}
