use std::sync::Arc;

use broker::{EventName, EventPublisher};
use common::{CustomerId, OrderId};
use stock::{ItemQuantity, StockService};

use crate::error::{OrderError, Result};
use crate::order::{Order, OrderItem, OrderPatch};
use crate::status::OrderStatus;
use crate::store::OrderStore;

/// Order saga coordinator.
///
/// Creates orders against the stock component, applies status updates and publishes the
/// matching `order.*` event. Publishing is best-effort: a failed publish is logged and the
/// persisted change stands.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    stock: StockService,
    publisher: EventPublisher,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, stock: StockService, publisher: EventPublisher) -> Self {
        Self {
            store,
            stock,
            publisher,
        }
    }

    pub fn stock(&self) -> &StockService {
        &self.stock
    }

    /// Creates a pending order and reserves its stock.
    ///
    /// Nothing is persisted when validation or the availability check fails. If the
    /// reservation itself fails afterwards (a concurrent order took the stock), the error is
    /// returned and the order stays `pending` without a reservation.
    #[tracing::instrument(skip(self, items), fields(customer_id = %customer_id, items = items.len()))]
    pub async fn create_order(&self, customer_id: CustomerId, items: &[ItemQuantity]) -> Result<Order> {
        if customer_id.is_empty() {
            return Err(OrderError::Validation("customer_id is required".to_string()));
        }
        if items.is_empty() {
            return Err(OrderError::Validation(
                "an order needs at least one item".to_string(),
            ));
        }
        if let Some(item) = items.iter().find(|item| item.quantity <= 0) {
            return Err(OrderError::Validation(format!(
                "quantity for item {} must be positive",
                item.id
            )));
        }

        let requested = ItemQuantity::aggregate(items)?;
        let availability = self.stock.check_stock_availability(&requested).await?;
        if let Some(shortage) = availability.shortages.first() {
            return Err(OrderError::InsufficientStock {
                item_id: shortage.id.clone(),
                requested: shortage.quantity,
            });
        }

        let mut lines = Vec::with_capacity(requested.len());
        for item in &requested {
            let catalog = availability
                .items
                .iter()
                .find(|c| c.id == item.id)
                .ok_or_else(|| OrderError::ItemNotFound(item.id.clone()))?;
            lines.push(OrderItem::from_catalog(catalog, item.quantity));
        }

        let order = Order::new(customer_id, lines);
        self.store.create(&order).await?;

        if let Err(e) = self.stock.reserve_stock(order.id, &requested).await {
            tracing::warn!(order_id = %order.id, error = %e, "Reservation failed, order stays pending");
            return Err(e.into());
        }

        self.publish(EventName::OrderCreated, &order).await;
        tracing::info!(order_id = %order.id, "Order created");
        Ok(order)
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.store.get(id).await
    }

    /// Loads an order only if it belongs to `customer_id`.
    pub async fn get_customer_order(&self, customer_id: &CustomerId, id: OrderId) -> Result<Order> {
        let order = self.store.get(id).await?;
        if &order.customer_id != customer_id {
            return Err(OrderError::NotFound(id));
        }
        Ok(order)
    }

    pub async fn get_orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        self.store.get_by_status(status).await
    }

    /// Merges `patch` into the order and publishes the event for a new status.
    ///
    /// Re-applying the current status changes nothing and publishes nothing.
    #[tracing::instrument(skip(self, patch), fields(order_id = %id, status = ?patch.status))]
    pub async fn update_order(&self, id: OrderId, patch: OrderPatch) -> Result<Order> {
        if patch.is_empty() {
            return self.store.get(id).await;
        }

        let change = self.store.update(id, &patch).await?;
        if change.status_changed() {
            tracing::info!(
                order_id = %id,
                from = %change.previous,
                to = %change.order.status,
                "Order status changed"
            );
            if let Some(event) = change.order.status.published_event() {
                self.publish(event, &change.order).await;
            }
        }
        Ok(change.order)
    }

    /// Stores the payment link and moves the order to `waiting_payment`.
    pub async fn attach_payment_link(&self, id: OrderId, link: impl Into<String>) -> Result<Order> {
        self.update_order(
            id,
            OrderPatch::status(OrderStatus::WaitingPayment).with_payment_link(link),
        )
        .await
    }

    pub async fn mark_paid(&self, id: OrderId) -> Result<Order> {
        self.update_order(id, OrderPatch::status(OrderStatus::Paid))
            .await
    }

    pub async fn start_preparing(&self, id: OrderId) -> Result<Order> {
        self.update_order(id, OrderPatch::status(OrderStatus::Preparing))
            .await
    }

    pub async fn mark_ready(&self, id: OrderId) -> Result<Order> {
        self.update_order(id, OrderPatch::status(OrderStatus::Ready))
            .await
    }

    async fn publish(&self, event: EventName, order: &Order) {
        if let Err(e) = self.publisher.publish(event, order).await {
            tracing::error!(order_id = %order.id, event = %event, error = %e, "Failed to publish order event");
        }
    }
}

#[cfg(test)]
mod tests {
    use broker::{BrokerSettings, InMemoryBroker, MessageBroker, QueueBinding, Topology};
    use common::ItemId;
    use stock::{InMemoryStockStore, Item, ReservationSettings, ReservationStatus, StockStore};

    use super::*;
    use crate::memory::InMemoryOrderStore;

    struct Fixture {
        service: OrderService,
        broker: Arc<InMemoryBroker>,
        orders: Arc<InMemoryOrderStore>,
        stock: Arc<InMemoryStockStore>,
    }

    async fn fixture() -> Fixture {
        let settings = BrokerSettings::default();
        let broker = Arc::new(InMemoryBroker::with_settings(&settings));
        broker
            .declare_topology(&Topology::order_saga(&settings))
            .await
            .unwrap();
        broker
            .declare_queue(&QueueBinding::subscriber(EventName::OrderPaid, "stock"))
            .await
            .unwrap();

        let stock = Arc::new(InMemoryStockStore::with_items([
            Item::new("1", "Burger", "price_burger", 5),
            Item::new("2", "Pommes", "price_pommes", 10),
        ]));
        let orders = Arc::new(InMemoryOrderStore::new());
        let service = OrderService::new(
            orders.clone(),
            StockService::new(stock.clone(), ReservationSettings::default()),
            EventPublisher::new(broker.clone(), &settings),
        );

        Fixture {
            service,
            broker,
            orders,
            stock,
        }
    }

    fn customer() -> CustomerId {
        CustomerId::new("cust-1")
    }

    #[tokio::test]
    async fn test_create_order_reserves_and_publishes() {
        let f = fixture().await;
        let order = f
            .service
            .create_order(
                customer(),
                &[
                    ItemQuantity::new("1", 1),
                    ItemQuantity::new("2", 2),
                    ItemQuantity::new("1", 1),
                ],
            )
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].name, "Burger");
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.items[0].price_id, "price_burger");

        let reservations = f.service.stock().reservations_for_order(order.id).await.unwrap();
        assert_eq!(reservations.len(), 2);
        assert!(reservations.iter().all(|r| r.status == ReservationStatus::Reserved));

        let created = f.broker.drain("order.created").await;
        assert_eq!(created.len(), 1);
        let payload: Order = created[0].decode().unwrap();
        assert_eq!(payload.id, order.id);
    }

    #[tokio::test]
    async fn test_create_order_validation() {
        let f = fixture().await;
        let err = f
            .service
            .create_order(CustomerId::new(""), &[ItemQuantity::new("1", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));

        let err = f.service.create_order(customer(), &[]).await.unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));

        let err = f
            .service
            .create_order(customer(), &[ItemQuantity::new("1", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
        assert!(f.orders.is_empty().await);
    }

    #[tokio::test]
    async fn test_insufficient_stock_persists_nothing() {
        let f = fixture().await;
        let err = f
            .service
            .create_order(customer(), &[ItemQuantity::new("1", 6)])
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::InsufficientStock { requested: 6, .. }));
        assert!(f.orders.is_empty().await);
        assert_eq!(f.broker.queue_depth("order.created").await, 0);
        assert_eq!(
            f.stock.get_available_quantity(&ItemId::new("1")).await.unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn test_overflowing_duplicate_quantities_are_rejected() {
        let f = fixture().await;
        let err = f
            .service
            .create_order(
                customer(),
                &[ItemQuantity::new("1", i32::MAX), ItemQuantity::new("1", 1)],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Validation(_)));
        assert!(f.orders.is_empty().await);
        assert_eq!(f.broker.queue_depth("order.created").await, 0);
    }

    #[tokio::test]
    async fn test_unknown_item_is_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .create_order(customer(), &[ItemQuantity::new("nope", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ItemNotFound(_)));
        assert!(f.orders.is_empty().await);
    }

    #[tokio::test]
    async fn test_status_updates_publish_once() {
        let f = fixture().await;
        let order = f
            .service
            .create_order(customer(), &[ItemQuantity::new("1", 1)])
            .await
            .unwrap();

        let order = f
            .service
            .attach_payment_link(order.id, "https://pay.example/1")
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::WaitingPayment);
        assert_eq!(order.payment_link.as_deref(), Some("https://pay.example/1"));

        f.service.mark_paid(order.id).await.unwrap();
        f.service.mark_paid(order.id).await.unwrap();
        assert_eq!(f.broker.queue_depth("order.paid").await, 1);
        assert_eq!(f.broker.queue_depth("order.paid.stock").await, 1);

        f.service.start_preparing(order.id).await.unwrap();
        f.service.mark_ready(order.id).await.unwrap();
        assert_eq!(f.broker.queue_depth("order.preparing").await, 1);
        assert_eq!(f.broker.queue_depth("order.ready").await, 1);

        let stored = f.service.get_order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Ready);
        assert_eq!(stored.payment_link.as_deref(), Some("https://pay.example/1"));
    }

    #[tokio::test]
    async fn test_backward_update_is_rejected() {
        let f = fixture().await;
        let order = f
            .service
            .create_order(customer(), &[ItemQuantity::new("2", 1)])
            .await
            .unwrap();
        f.service.mark_paid(order.id).await.unwrap();

        let err = f
            .service
            .update_order(order.id, OrderPatch::status(OrderStatus::Pending))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidStatusTransition { .. }));
        assert_eq!(
            f.service.get_order(order.id).await.unwrap().status,
            OrderStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_empty_patch_returns_order_unchanged() {
        let f = fixture().await;
        let order = f
            .service
            .create_order(customer(), &[ItemQuantity::new("2", 1)])
            .await
            .unwrap();

        let patch = OrderPatch {
            status: None,
            payment_link: Some(String::new()),
        };
        let unchanged = f.service.update_order(order.id, patch).await.unwrap();
        assert_eq!(unchanged, order);
    }

    #[tokio::test]
    async fn test_orders_by_status_and_customer_scope() {
        let f = fixture().await;
        let order = f
            .service
            .create_order(customer(), &[ItemQuantity::new("2", 1)])
            .await
            .unwrap();

        let pending = f
            .service
            .get_orders_by_status(OrderStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        assert!(f.service.get_customer_order(&customer(), order.id).await.is_ok());
        let err = f
            .service
            .get_customer_order(&CustomerId::new("someone-else"), order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_update() {
        let f = fixture().await;
        let order = f
            .service
            .create_order(customer(), &[ItemQuantity::new("2", 1)])
            .await
            .unwrap();
        f.broker.close().await.unwrap();

        let paid = f.service.mark_paid(order.id).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
    }
}
