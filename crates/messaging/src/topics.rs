//! Topic names for the saga message channels.
//!
//! Event channels carry facts published by the owning service; command
//! channels are consumed only by the service that owns them.

/// Events published by the orders service.
pub const ORDERS_EVENTS: &str = "orders-events";

/// Events published by the inventory service.
pub const PRODUCTS_EVENTS: &str = "products-events";

/// Events published by the payments service.
pub const PAYMENTS_EVENTS: &str = "payments-events";

/// Commands addressed to the inventory service.
pub const PRODUCTS_COMMANDS: &str = "products-commands";

/// Commands addressed to the payments service.
pub const PAYMENTS_COMMANDS: &str = "payments-commands";
