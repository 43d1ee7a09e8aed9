use async_trait::async_trait;
use broker::{EventName, HandlerError, MessageEnvelope, MessageHandler, QueueBinding};
use orders::{Order, OrderError, OrderService, OrderStatus};

/// Consumes `order.paid` and starts preparing the order.
pub struct KitchenHandler {
    orders: OrderService,
}

impl KitchenHandler {
    pub fn new(orders: OrderService) -> Self {
        Self { orders }
    }

    pub fn binding() -> QueueBinding {
        QueueBinding::primary(EventName::OrderPaid)
    }
}

#[async_trait]
impl MessageHandler for KitchenHandler {
    async fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        let order: Order = envelope.decode()?;

        if order.status != OrderStatus::Paid {
            tracing::debug!(order_id = %order.id, status = %order.status, "Skipping order that is not paid");
            return Ok(());
        }

        match self.orders.start_preparing(order.id).await {
            Ok(_) => {
                tracing::info!(order_id = %order.id, "Kitchen started preparing order");
                Ok(())
            }
            // Redelivery after the order already moved on.
            Err(OrderError::InvalidStatusTransition { from, .. }) => {
                tracing::info!(order_id = %order.id, status = %from, "Order already past preparing");
                Ok(())
            }
            Err(e) => Err(HandlerError::failed(e)),
        }
    }
}
