use async_trait::async_trait;
use common::OrderId;

use crate::error::Result;
use crate::order::{Order, OrderPatch, StatusChange};
use crate::status::OrderStatus;

/// Persistence for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order.
    async fn create(&self, order: &Order) -> Result<()>;

    /// Loads one order, failing with `NotFound` when it does not exist.
    async fn get(&self, id: OrderId) -> Result<Order>;

    /// Atomically merges `patch` into the stored order.
    ///
    /// Fails with `InvalidStatusTransition` if the patch would move the status backward;
    /// the stored order is unchanged in that case.
    async fn update(&self, id: OrderId, patch: &OrderPatch) -> Result<StatusChange>;

    /// All orders in `status`, oldest first.
    async fn get_by_status(&self, status: OrderStatus) -> Result<Vec<Order>>;
}
