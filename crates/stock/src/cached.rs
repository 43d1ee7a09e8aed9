//! Cache-aside wrapper around a [`StockStore`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ItemId, OrderId};

use crate::cache::ItemCache;
use crate::error::Result;
use crate::item::{Item, ItemQuantity, Reservation, ReservationId};
use crate::store::StockStore;

/// Serves catalog reads from an [`ItemCache`] and falls back to the durable store on a miss.
///
/// Cache failures are logged and treated as misses; they never fail a read. Writes go to the
/// store first and only then drop the cache entry, so the next read repopulates it.
/// Reservation operations pass straight through.
pub struct CachedStockStore<S> {
    store: S,
    cache: Arc<dyn ItemCache>,
}

impl<S: StockStore> CachedStockStore<S> {
    pub fn new(store: S, cache: Arc<dyn ItemCache>) -> Self {
        Self { store, cache }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    async fn populate(&self, item: &Item) {
        if let Err(e) = self.cache.set_item(item).await {
            tracing::warn!(item_id = %item.id, error = %e, "Failed to populate item cache");
        }
    }
}

#[async_trait]
impl<S: StockStore> StockStore for CachedStockStore<S> {
    async fn get_item(&self, id: &ItemId) -> Result<Item> {
        match self.cache.get_item(id).await {
            Ok(Some(item)) => {
                tracing::debug!(item_id = %id, "Item cache hit");
                return Ok(item);
            }
            Ok(None) => tracing::debug!(item_id = %id, "Item cache miss"),
            Err(e) => tracing::warn!(item_id = %id, error = %e, "Item cache read failed"),
        }

        let item = self.store.get_item(id).await?;
        self.populate(&item).await;
        Ok(item)
    }

    async fn get_items(&self, ids: &[ItemId]) -> Result<Vec<Item>> {
        // "Everything" is not a cacheable shape.
        if ids.is_empty() {
            return self.store.get_items(ids).await;
        }

        let mut cached = match self.cache.get_items(ids).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "Item cache batch read failed");
                Default::default()
            }
        };

        let missed: Vec<ItemId> = ids
            .iter()
            .filter(|id| !cached.contains_key(*id))
            .cloned()
            .collect();
        tracing::debug!(
            hits = ids.len() - missed.len(),
            misses = missed.len(),
            "Item cache batch lookup"
        );

        if !missed.is_empty() {
            for item in self.store.get_items(&missed).await? {
                self.populate(&item).await;
                cached.insert(item.id.clone(), item);
            }
        }

        Ok(ids.iter().filter_map(|id| cached.get(id).cloned()).collect())
    }

    async fn get_available_quantity(&self, id: &ItemId) -> Result<i32> {
        self.store.get_available_quantity(id).await
    }

    async fn decrement_quantity(&self, id: &ItemId, amount: i32) -> Result<()> {
        self.store.decrement_quantity(id, amount).await?;

        if let Err(e) = self.cache.invalidate_item(id).await {
            tracing::warn!(item_id = %id, error = %e, "Failed to invalidate item cache");
        } else {
            tracing::debug!(item_id = %id, "Item cache invalidated");
        }
        Ok(())
    }

    async fn reserve_stock(
        &self,
        order_id: OrderId,
        items: &[ItemQuantity],
        expires_at: DateTime<Utc>,
    ) -> Result<ReservationId> {
        self.store.reserve_stock(order_id, items, expires_at).await
    }

    async fn confirm_reservation(&self, order_id: OrderId) -> Result<()> {
        self.store.confirm_reservation(order_id).await
    }

    async fn release_reservation(&self, order_id: OrderId) -> Result<()> {
        self.store.release_reservation(order_id).await
    }

    async fn cleanup_expired_reservations(&self, now: DateTime<Utc>) -> Result<u64> {
        self.store.cleanup_expired_reservations(now).await
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        self.store.reservations_for_order(order_id).await
    }
}
