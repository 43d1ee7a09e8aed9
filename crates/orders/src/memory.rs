use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use tokio::sync::RwLock;

use crate::error::{OrderError, Result};
use crate::order::{Order, OrderPatch, StatusChange};
use crate::status::OrderStatus;
use crate::store::OrderStore;

/// In-memory order store for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(OrderError::Validation(format!(
                "order {} already exists",
                order.id
            )));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Order> {
        self.orders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(OrderError::NotFound(id))
    }

    async fn update(&self, id: OrderId, patch: &OrderPatch) -> Result<StatusChange> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&id).ok_or(OrderError::NotFound(id))?;

        let previous = stored.status;
        stored.apply(patch)?;

        Ok(StatusChange {
            previous,
            order: stored.clone(),
        })
    }

    async fn get_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let mut matching: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|order| order.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|order| order.created_at);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use common::CustomerId;

    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryOrderStore::new();
        let order = Order::new(CustomerId::new("c"), Vec::new());
        store.create(&order).await.unwrap();

        assert_eq!(store.get(order.id).await.unwrap(), order);
        assert!(store.create(&order).await.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing_order() {
        let store = InMemoryOrderStore::new();
        let id = OrderId::new();
        assert!(matches!(store.get(id).await, Err(OrderError::NotFound(missing)) if missing == id));
        assert!(matches!(
            store.update(id, &OrderPatch::status(OrderStatus::Paid)).await,
            Err(OrderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_reports_previous_status() {
        let store = InMemoryOrderStore::new();
        let order = Order::new(CustomerId::new("c"), Vec::new());
        store.create(&order).await.unwrap();

        let change = store
            .update(order.id, &OrderPatch::status(OrderStatus::Paid))
            .await
            .unwrap();
        assert_eq!(change.previous, OrderStatus::Pending);
        assert_eq!(change.order.status, OrderStatus::Paid);
        assert!(change.status_changed());

        let err = store
            .update(order.id, &OrderPatch::status(OrderStatus::WaitingPayment))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidStatusTransition { .. }));
        assert_eq!(store.get(order.id).await.unwrap().status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_get_by_status_filters() {
        let store = InMemoryOrderStore::new();
        let first = Order::new(CustomerId::new("a"), Vec::new());
        let second = Order::new(CustomerId::new("b"), Vec::new());
        store.create(&first).await.unwrap();
        store.create(&second).await.unwrap();
        store
            .update(second.id, &OrderPatch::status(OrderStatus::Paid))
            .await
            .unwrap();

        let pending = store.get_by_status(OrderStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);
        assert!(store.get_by_status(OrderStatus::Ready).await.unwrap().is_empty());
    }
}
