//! Payment-link creation.

use async_trait::async_trait;
use orders::Order;

use crate::error::{Result, SagaError};

/// Creates a hosted checkout link for an order.
///
/// Implementations call the payment provider; the link is stored on the order and the
/// provider later reports completion through the payment-completed endpoint.
#[async_trait]
pub trait PaymentLinkCreator: Send + Sync {
    async fn create_payment_link(&self, order: &Order) -> Result<String>;
}

/// Builds `<base_url>/<order_id>` links for a hosted checkout page.
///
/// Deterministic, so a redelivered `order.created` yields the same link.
#[derive(Debug, Clone)]
pub struct HostedCheckoutLinks {
    base_url: String,
}

impl HostedCheckoutLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PaymentLinkCreator for HostedCheckoutLinks {
    async fn create_payment_link(&self, order: &Order) -> Result<String> {
        if self.base_url.is_empty() {
            return Err(SagaError::PaymentLink("no checkout base url configured".to_string()));
        }
        if order.items.is_empty() {
            return Err(SagaError::PaymentLink(format!("order {} has no items", order.id)));
        }
        Ok(format!("{}/{}", self.base_url, order.id))
    }
}

#[cfg(test)]
mod tests {
    use common::{CustomerId, ItemId};
    use orders::OrderItem;

    use super::*;

    fn order() -> Order {
        Order::new(
            CustomerId::new("c"),
            vec![OrderItem {
                id: ItemId::new("1"),
                name: "Burger".to_string(),
                quantity: 1,
                price_id: "price_1".to_string(),
            }],
        )
    }

    #[tokio::test]
    async fn test_link_uses_order_id() {
        let links = HostedCheckoutLinks::new("https://checkout.example/pay/");
        let order = order();
        let link = links.create_payment_link(&order).await.unwrap();
        assert_eq!(link, format!("https://checkout.example/pay/{}", order.id));
    }

    #[tokio::test]
    async fn test_order_without_items_is_rejected() {
        let links = HostedCheckoutLinks::new("https://checkout.example");
        let mut order = order();
        order.items.clear();
        assert!(matches!(
            links.create_payment_link(&order).await,
            Err(SagaError::PaymentLink(_))
        ));
    }
}
