use chrono::{DateTime, Utc};
use common::{ItemId, OrderId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StockError};

/// A catalog entry with its stock counters.
///
/// `0 <= reserved_quantity <= quantity` always holds; callers should rely on
/// [`Item::available`] only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    /// Reference to the price in the payment provider.
    pub price_id: String,
    pub quantity: i32,
    pub reserved_quantity: i32,
}

impl Item {
    pub fn new(id: impl Into<ItemId>, name: impl Into<String>, price_id: impl Into<String>, quantity: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price_id: price_id.into(),
            quantity,
            reserved_quantity: 0,
        }
    }

    /// Units that can still be reserved.
    pub fn available(&self) -> i32 {
        self.quantity - self.reserved_quantity
    }
}

/// A requested item id and quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuantity {
    pub id: ItemId,
    pub quantity: i32,
}

impl ItemQuantity {
    pub fn new(id: impl Into<ItemId>, quantity: i32) -> Self {
        Self {
            id: id.into(),
            quantity,
        }
    }

    /// Merges entries with the same id by summing their quantities. The first occurrence
    /// of each id decides its position. A sum that does not fit an `i32` fails with
    /// [`StockError::InvalidQuantity`].
    pub fn aggregate(items: &[ItemQuantity]) -> Result<Vec<ItemQuantity>> {
        let mut merged: Vec<ItemQuantity> = Vec::with_capacity(items.len());
        for item in items {
            match merged.iter_mut().find(|m| m.id == item.id) {
                Some(existing) => {
                    existing.quantity = checked_sum(&item.id, existing.quantity, item.quantity)?;
                }
                None => merged.push(item.clone()),
            }
        }
        Ok(merged)
    }
}

/// Adds two requested quantities of the same item.
pub(crate) fn checked_sum(item_id: &ItemId, total: i32, quantity: i32) -> Result<i32> {
    total
        .checked_add(quantity)
        .ok_or_else(|| StockError::InvalidQuantity {
            item_id: item_id.clone(),
            quantity: total.saturating_add(quantity),
        })
}

/// Groups the reservation rows created by one `reserve_stock` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(Uuid);

impl ReservationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a reservation row. `Confirmed`, `Released` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Reserved,
    Confirmed,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "reserved",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reserved" => Some(ReservationStatus::Reserved),
            "confirmed" => Some(ReservationStatus::Confirmed),
            "released" => Some(ReservationStatus::Released),
            "expired" => Some(ReservationStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Reserved)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger row: a hold on `quantity` units of one item for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub quantity: i32,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The catalog loaded into fresh stores.
pub fn starter_catalog() -> Vec<Item> {
    vec![
        Item::new("1", "Burger", "price_1SQYsL3th7a1Jo3bsOVNnRpm", 20),
        Item::new("2", "Pommes", "price_pommes", 15),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available() {
        let mut item = Item::new("1", "Burger", "price_1", 10);
        item.reserved_quantity = 4;
        assert_eq!(item.available(), 6);
    }

    #[test]
    fn test_aggregate_sums_duplicates_in_first_seen_order() {
        let merged = ItemQuantity::aggregate(&[
            ItemQuantity::new("2", 1),
            ItemQuantity::new("1", 2),
            ItemQuantity::new("2", 3),
        ])
        .unwrap();
        assert_eq!(
            merged,
            vec![ItemQuantity::new("2", 4), ItemQuantity::new("1", 2)]
        );
    }

    #[test]
    fn test_aggregate_rejects_overflowing_sum() {
        let err = ItemQuantity::aggregate(&[
            ItemQuantity::new("1", i32::MAX),
            ItemQuantity::new("2", 1),
            ItemQuantity::new("1", 1),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            StockError::InvalidQuantity { ref item_id, quantity: i32::MAX } if item_id.as_str() == "1"
        ));
    }

    #[test]
    fn test_reservation_status_round_trip() {
        for status in [
            ReservationStatus::Reserved,
            ReservationStatus::Confirmed,
            ReservationStatus::Released,
            ReservationStatus::Expired,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReservationStatus::parse("cancelled"), None);
    }

    #[test]
    fn test_only_reserved_is_active() {
        assert!(!ReservationStatus::Reserved.is_terminal());
        assert!(ReservationStatus::Confirmed.is_terminal());
        assert!(ReservationStatus::Released.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
    }
}
