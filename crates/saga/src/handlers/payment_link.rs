use std::sync::Arc;

use async_trait::async_trait;
use broker::{EventName, HandlerError, MessageEnvelope, MessageHandler, QueueBinding};
use orders::{Order, OrderError, OrderService};

use crate::payment::PaymentLinkCreator;

/// Consumes `order.created`, creates a payment link and moves the order to `waiting_payment`.
pub struct PaymentLinkHandler {
    orders: OrderService,
    payments: Arc<dyn PaymentLinkCreator>,
}

impl PaymentLinkHandler {
    pub fn new(orders: OrderService, payments: Arc<dyn PaymentLinkCreator>) -> Self {
        Self { orders, payments }
    }

    pub fn binding() -> QueueBinding {
        QueueBinding::primary(EventName::OrderCreated)
    }
}

#[async_trait]
impl MessageHandler for PaymentLinkHandler {
    #[tracing::instrument(skip(self, envelope), fields(order_id = tracing::field::Empty))]
    async fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        let order: Order = envelope.decode()?;
        tracing::Span::current().record("order_id", tracing::field::display(order.id));

        let link = self.payments.create_payment_link(&order).await?;
        match self.orders.attach_payment_link(order.id, link).await {
            Ok(updated) => {
                tracing::info!(order_id = %updated.id, "Payment link attached");
                Ok(())
            }
            Err(OrderError::InvalidStatusTransition { from, .. }) => {
                tracing::info!(order_id = %order.id, status = %from, "Order already past payment link step");
                Ok(())
            }
            Err(e) => Err(HandlerError::failed(e)),
        }
    }
}
