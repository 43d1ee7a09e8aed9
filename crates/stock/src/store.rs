use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ItemId, OrderId};

use crate::error::{Result, StockError};
use crate::item::{Item, ItemQuantity, Reservation, ReservationId};

/// Durable catalog and reservation ledger.
///
/// Every mutating operation is all-or-nothing: either every row it touches is updated or
/// none is.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn get_item(&self, id: &ItemId) -> Result<Item>;

    /// Returns the requested items in request order, skipping unknown ids.
    /// An empty `ids` returns the whole catalog ordered by id.
    async fn get_items(&self, ids: &[ItemId]) -> Result<Vec<Item>>;

    /// `quantity - reserved_quantity` for the item.
    async fn get_available_quantity(&self, id: &ItemId) -> Result<i32>;

    /// Permanently removes `amount` units that are not held by a reservation.
    async fn decrement_quantity(&self, id: &ItemId, amount: i32) -> Result<()>;

    /// Holds stock for every item of an order until `expires_at`.
    ///
    /// Fails with [`StockError::InsufficientStock`] if any item cannot be covered, in which
    /// case nothing is reserved.
    async fn reserve_stock(
        &self,
        order_id: OrderId,
        items: &[ItemQuantity],
        expires_at: DateTime<Utc>,
    ) -> Result<ReservationId>;

    /// Turns the order's active reservations into a permanent stock deduction.
    ///
    /// Fails with [`StockError::NoActiveReservation`] when nothing is reserved.
    async fn confirm_reservation(&self, order_id: OrderId) -> Result<()>;

    /// Returns the order's reserved units to available stock. A no-op when nothing is
    /// reserved.
    async fn release_reservation(&self, order_id: OrderId) -> Result<()>;

    /// Releases every reservation that expired before `now` and marks it `expired`.
    /// Returns the number of rows processed.
    async fn cleanup_expired_reservations(&self, now: DateTime<Utc>) -> Result<u64>;

    /// All ledger rows of an order, oldest first.
    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>>;
}

/// Rejects non-positive quantities before any row is touched.
pub(crate) fn validate_quantities(items: &[ItemQuantity]) -> Result<()> {
    match items.iter().find(|i| i.quantity <= 0) {
        Some(item) => Err(StockError::InvalidQuantity {
            item_id: item.id.clone(),
            quantity: item.quantity,
        }),
        None => Ok(()),
    }
}

/// Reorders `found` to follow `ids`, dropping ids that were not found.
pub(crate) fn in_request_order(ids: &[ItemId], found: Vec<Item>) -> Vec<Item> {
    ids.iter()
        .filter_map(|id| found.iter().find(|item| &item.id == id).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantities() {
        assert!(validate_quantities(&[ItemQuantity::new("1", 2)]).is_ok());
        let err = validate_quantities(&[ItemQuantity::new("1", 2), ItemQuantity::new("2", 0)])
            .unwrap_err();
        assert!(matches!(err, StockError::InvalidQuantity { quantity: 0, .. }));
    }

    #[test]
    fn test_in_request_order() {
        let found = vec![
            Item::new("1", "Burger", "p1", 1),
            Item::new("2", "Pommes", "p2", 1),
        ];
        let ids = [ItemId::new("2"), ItemId::new("9"), ItemId::new("1")];
        let ordered = in_request_order(&ids, found);
        let names: Vec<_> = ordered.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Pommes", "Burger"]);
    }
}
