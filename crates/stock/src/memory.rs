use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ItemId, OrderId};
use tokio::sync::Mutex;

use crate::error::{Result, StockError};
use crate::item::{Item, ItemQuantity, Reservation, ReservationId, ReservationStatus, checked_sum};
use crate::store::{StockStore, in_request_order, validate_quantities};

#[derive(Default)]
struct State {
    items: BTreeMap<ItemId, Item>,
    reservations: Vec<Reservation>,
}

impl State {
    fn item_mut(&mut self, id: &ItemId) -> Result<&mut Item> {
        self.items
            .get_mut(id)
            .ok_or_else(|| StockError::ItemNotFound(id.clone()))
    }

    fn active_rows(&self, order_id: OrderId) -> Vec<usize> {
        self.reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.order_id == order_id && r.status == ReservationStatus::Reserved)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Checks that every row can be settled before anything is changed.
    fn check_covered(&self, rows: &[usize], confirm: bool) -> Result<()> {
        for &idx in rows {
            let row = &self.reservations[idx];
            let covered = self.items.get(&row.item_id).is_some_and(|item| {
                item.reserved_quantity >= row.quantity && (!confirm || item.quantity >= row.quantity)
            });
            if !covered {
                return Err(StockError::ReservationMismatch {
                    order_id: row.order_id,
                    item_id: row.item_id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// In-memory stock store.
///
/// A single lock is held for the whole of each operation, which gives the same
/// all-or-nothing behavior as the transactional store.
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given catalog.
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let state = State {
            items: items.into_iter().map(|i| (i.id.clone(), i)).collect(),
            reservations: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Adds or replaces a catalog entry.
    pub async fn insert_item(&self, item: Item) {
        self.state.lock().await.items.insert(item.id.clone(), item);
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn get_item(&self, id: &ItemId) -> Result<Item> {
        self.state
            .lock()
            .await
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| StockError::ItemNotFound(id.clone()))
    }

    async fn get_items(&self, ids: &[ItemId]) -> Result<Vec<Item>> {
        let state = self.state.lock().await;
        if ids.is_empty() {
            return Ok(state.items.values().cloned().collect());
        }
        let found = ids
            .iter()
            .filter_map(|id| state.items.get(id).cloned())
            .collect();
        Ok(in_request_order(ids, found))
    }

    async fn get_available_quantity(&self, id: &ItemId) -> Result<i32> {
        self.get_item(id).await.map(|item| item.available())
    }

    async fn decrement_quantity(&self, id: &ItemId, amount: i32) -> Result<()> {
        validate_quantities(&[ItemQuantity::new(id.clone(), amount)])?;
        let mut state = self.state.lock().await;
        let item = state.item_mut(id)?;
        if item.available() < amount {
            return Err(StockError::InsufficientStock {
                item_id: id.clone(),
                requested: amount,
            });
        }
        item.quantity -= amount;
        Ok(())
    }

    async fn reserve_stock(
        &self,
        order_id: OrderId,
        items: &[ItemQuantity],
        expires_at: DateTime<Utc>,
    ) -> Result<ReservationId> {
        validate_quantities(items)?;
        let mut state = self.state.lock().await;

        // Requests for the same item add up, as consecutive guarded updates would.
        let mut wanted: BTreeMap<&ItemId, i32> = BTreeMap::new();
        for requested in items {
            let total = wanted.entry(&requested.id).or_default();
            *total = checked_sum(&requested.id, *total, requested.quantity)?;
        }
        for (id, quantity) in &wanted {
            let item = state
                .items
                .get(*id)
                .ok_or_else(|| StockError::ItemNotFound((*id).clone()))?;
            if item.available() < *quantity {
                return Err(StockError::InsufficientStock {
                    item_id: (*id).clone(),
                    requested: *quantity,
                });
            }
        }

        let reservation_id = ReservationId::new();
        let now = Utc::now();
        for requested in items {
            state.item_mut(&requested.id)?.reserved_quantity += requested.quantity;
            state.reservations.push(Reservation {
                reservation_id,
                order_id,
                item_id: requested.id.clone(),
                quantity: requested.quantity,
                status: ReservationStatus::Reserved,
                expires_at,
                created_at: now,
                updated_at: now,
            });
        }
        Ok(reservation_id)
    }

    async fn confirm_reservation(&self, order_id: OrderId) -> Result<()> {
        let mut state = self.state.lock().await;
        let rows = state.active_rows(order_id);
        if rows.is_empty() {
            return Err(StockError::NoActiveReservation(order_id));
        }
        state.check_covered(&rows, true)?;

        let now = Utc::now();
        for idx in rows {
            let (item_id, quantity) = {
                let row = &mut state.reservations[idx];
                row.status = ReservationStatus::Confirmed;
                row.updated_at = now;
                (row.item_id.clone(), row.quantity)
            };
            let item = state.item_mut(&item_id)?;
            item.quantity -= quantity;
            item.reserved_quantity -= quantity;
        }
        Ok(())
    }

    async fn release_reservation(&self, order_id: OrderId) -> Result<()> {
        let mut state = self.state.lock().await;
        let rows = state.active_rows(order_id);
        if rows.is_empty() {
            return Ok(());
        }
        state.check_covered(&rows, false)?;

        let now = Utc::now();
        for idx in rows {
            let (item_id, quantity) = {
                let row = &mut state.reservations[idx];
                row.status = ReservationStatus::Released;
                row.updated_at = now;
                (row.item_id.clone(), row.quantity)
            };
            state.item_mut(&item_id)?.reserved_quantity -= quantity;
        }
        Ok(())
    }

    async fn cleanup_expired_reservations(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let expired: Vec<usize> = state
            .reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == ReservationStatus::Reserved && r.expires_at < now)
            .map(|(idx, _)| idx)
            .collect();

        for &idx in &expired {
            let (item_id, quantity) = {
                let row = &mut state.reservations[idx];
                row.status = ReservationStatus::Expired;
                row.updated_at = now;
                (row.item_id.clone(), row.quantity)
            };
            // An item that no longer covers the row is left as is; the row still expires.
            if let Some(item) = state.items.get_mut(&item_id)
                && item.reserved_quantity >= quantity
            {
                item.reserved_quantity -= quantity;
            }
        }
        Ok(expired.len() as u64)
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        Ok(self
            .state
            .lock()
            .await
            .reservations
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }
}
