//! The order record.

use common::{CustomerId, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::status::OrderStatus;

/// An order as owned by the orders service.
///
/// Created on placement, never deleted; terminal statuses are retained for
/// audit. The status field is mutated only by the orchestrator reacting to
/// domain events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub total: Money,
    pub status: OrderStatus,
}
