use chrono::{DateTime, Utc};
use common::{CustomerId, ItemId, OrderId};
use serde::{Deserialize, Serialize};
use stock::Item;

use crate::error::{OrderError, Result};
use crate::status::OrderStatus;

/// One order line, carrying the catalog name and payment price reference at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: ItemId,
    pub name: String,
    pub quantity: i32,
    pub price_id: String,
}

impl OrderItem {
    pub fn from_catalog(item: &Item, quantity: i32) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            quantity,
            price_id: item.price_id.clone(),
        }
    }
}

/// A customer order.
///
/// This is also the payload of every `order.*` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    /// Set once, when the payment link is attached.
    #[serde(default)]
    pub payment_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order with a fresh id.
    pub fn new(customer_id: CustomerId, items: Vec<OrderItem>) -> Self {
        Self {
            id: OrderId::new(),
            customer_id,
            status: OrderStatus::Pending,
            items,
            payment_link: None,
            created_at: Utc::now(),
        }
    }

    /// Merges `patch` into this order.
    ///
    /// The status may only move forward. A payment link is kept once set; a different
    /// link in a later patch is ignored.
    pub fn apply(&mut self, patch: &OrderPatch) -> Result<()> {
        if let Some(next) = patch.status {
            if !self.status.can_transition_to(next) {
                return Err(OrderError::InvalidStatusTransition {
                    from: self.status,
                    to: next,
                });
            }
            self.status = next;
        }
        if let Some(link) = patch.payment_link() {
            match &self.payment_link {
                Some(existing) if existing != link => {
                    tracing::warn!(order_id = %self.id, "Payment link already set, keeping the first one");
                }
                Some(_) => {}
                None => self.payment_link = Some(link.to_string()),
            }
        }
        Ok(())
    }
}

/// A partial update. Absent fields, and an empty payment link, leave stored state untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub payment_link: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            payment_link: None,
        }
    }

    pub fn with_payment_link(mut self, link: impl Into<String>) -> Self {
        self.payment_link = Some(link.into());
        self
    }

    /// The payment link, if one was supplied and is non-empty.
    pub fn payment_link(&self) -> Option<&str> {
        self.payment_link
            .as_deref()
            .map(str::trim)
            .filter(|link| !link.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.payment_link().is_none()
    }
}

/// Outcome of a stored update: the status before it and the merged order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub previous: OrderStatus,
    pub order: Order,
}

impl StatusChange {
    pub fn status_changed(&self) -> bool {
        self.previous != self.order.status
    }
}
