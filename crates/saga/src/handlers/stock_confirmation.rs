use async_trait::async_trait;
use broker::{EventName, HandlerError, MessageEnvelope, MessageHandler, QueueBinding};
use orders::Order;
use stock::StockService;

/// Subscriber group for the stock side of `order.paid`.
pub const STOCK_GROUP: &str = "stock";

/// Consumes `order.paid` on its own queue and turns the order's reservation into a
/// permanent stock decrement.
///
/// A missing active reservation fails the message, so a repeated anomaly ends in
/// `order.paid.dlq` for investigation.
pub struct StockConfirmationHandler {
    stock: StockService,
}

impl StockConfirmationHandler {
    pub fn new(stock: StockService) -> Self {
        Self { stock }
    }

    pub fn binding() -> QueueBinding {
        QueueBinding::subscriber(EventName::OrderPaid, STOCK_GROUP)
    }
}

#[async_trait]
impl MessageHandler for StockConfirmationHandler {
    async fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        let order: Order = envelope.decode()?;

        if let Err(e) = self.stock.confirm_reservation(order.id).await {
            if e.is_consistency_anomaly() {
                tracing::error!(order_id = %order.id, error = %e, "No active reservation to confirm");
            }
            return Err(HandlerError::failed(e));
        }

        tracing::info!(order_id = %order.id, "Reservation confirmed");
        Ok(())
    }
}
