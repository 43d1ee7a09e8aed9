use std::sync::Arc;

use chrono::Utc;
use common::{ItemId, OrderId};

use crate::error::{Result, StockError};
use crate::item::{Item, ItemQuantity, Reservation, ReservationId};
use crate::settings::ReservationSettings;
use crate::store::{StockStore, validate_quantities};

/// Result of an availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAvailability {
    pub all_available: bool,
    /// Catalog entries for the requested ids, in request order.
    pub items: Vec<Item>,
    /// Requested entries that cannot currently be covered.
    pub shortages: Vec<ItemQuantity>,
}

/// Operations surface of the stock component.
#[derive(Clone)]
pub struct StockService {
    store: Arc<dyn StockStore>,
    settings: ReservationSettings,
}

impl StockService {
    pub fn new(store: Arc<dyn StockStore>, settings: ReservationSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &ReservationSettings {
        &self.settings
    }

    /// Checks whether every requested quantity is currently available.
    ///
    /// Catalog data may come from the cache, but the decision uses the durable
    /// `quantity - reserved_quantity`. Unknown ids fail with [`StockError::ItemNotFound`].
    #[tracing::instrument(skip(self, items), fields(items = items.len()))]
    pub async fn check_stock_availability(&self, items: &[ItemQuantity]) -> Result<StockAvailability> {
        let requested = ItemQuantity::aggregate(items)?;
        validate_quantities(&requested)?;

        let ids: Vec<ItemId> = requested.iter().map(|i| i.id.clone()).collect();
        let catalog = if ids.is_empty() {
            Vec::new()
        } else {
            self.store.get_items(&ids).await?
        };

        let mut shortages = Vec::new();
        for item in &requested {
            if !catalog.iter().any(|c| c.id == item.id) {
                return Err(StockError::ItemNotFound(item.id.clone()));
            }
            let available = self.store.get_available_quantity(&item.id).await?;
            if available < item.quantity {
                tracing::debug!(item_id = %item.id, requested = item.quantity, available, "Insufficient stock");
                shortages.push(item.clone());
            }
        }

        Ok(StockAvailability {
            all_available: shortages.is_empty(),
            items: catalog,
            shortages,
        })
    }

    /// Catalog entries for `ids`; an empty slice returns the full catalog.
    pub async fn get_items(&self, ids: &[ItemId]) -> Result<Vec<Item>> {
        self.store.get_items(ids).await
    }

    pub async fn get_item(&self, id: &ItemId) -> Result<Item> {
        self.store.get_item(id).await
    }

    pub async fn get_available_quantity(&self, id: &ItemId) -> Result<i32> {
        self.store.get_available_quantity(id).await
    }

    /// Reserves stock for an order until now plus the reservation TTL.
    #[tracing::instrument(skip(self, items), fields(order_id = %order_id))]
    pub async fn reserve_stock(&self, order_id: OrderId, items: &[ItemQuantity]) -> Result<ReservationId> {
        let expires_at = self.settings.expires_at(Utc::now());
        let reservation_id = self.store.reserve_stock(order_id, items, expires_at).await?;
        tracing::info!(reservation_id = %reservation_id, %expires_at, "Stock reserved");
        Ok(reservation_id)
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn confirm_reservation(&self, order_id: OrderId) -> Result<()> {
        self.store.confirm_reservation(order_id).await?;
        tracing::info!("Reservation confirmed");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn release_reservation(&self, order_id: OrderId) -> Result<()> {
        self.store.release_reservation(order_id).await?;
        tracing::info!("Reservation released");
        Ok(())
    }

    /// Expires every reservation past its expiry time. Returns the number of rows expired.
    pub async fn cleanup_expired_reservations(&self) -> Result<u64> {
        self.store.cleanup_expired_reservations(Utc::now()).await
    }

    pub async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        self.store.reservations_for_order(order_id).await
    }
}
