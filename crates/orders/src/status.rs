//! Order status state machine.

use broker::EventName;
use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Transitions only move forward:
/// ```text
/// Pending ──► WaitingPayment ──► Paid ──► Preparing ──► Ready
/// ```
/// `Ord` follows the lifecycle, so `a < b` means `a` comes first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created and stock reserved, no payment link yet.
    #[default]
    Pending,

    /// A payment link was attached; waiting for the customer to pay.
    WaitingPayment,

    /// Payment completed.
    Paid,

    /// The kitchen is preparing the order.
    Preparing,

    /// Ready for pickup (terminal state).
    Ready,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::WaitingPayment,
        OrderStatus::Paid,
        OrderStatus::Preparing,
        OrderStatus::Ready,
    ];

    /// Returns true if `next` is a valid target: a later status, or the same one (no-op).
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        next >= *self
    }

    /// The event published when an order advances to this status through an update.
    ///
    /// `waiting_payment` is driven by the payment-link callback and publishes nothing.
    pub fn published_event(&self) -> Option<EventName> {
        match self {
            OrderStatus::Paid => Some(EventName::OrderPaid),
            OrderStatus::Preparing => Some(EventName::OrderPreparing),
            OrderStatus::Ready => Some(EventName::OrderReady),
            OrderStatus::Pending | OrderStatus::WaitingPayment => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::WaitingPayment => "waiting_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
