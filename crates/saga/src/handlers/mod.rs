//! Message handlers for the saga consumers.

mod kitchen;
mod payment_link;
mod stock_confirmation;

pub use kitchen::KitchenHandler;
pub use payment_link::PaymentLinkHandler;
pub use stock_confirmation::StockConfirmationHandler;
