//! Payment records.

use std::collections::HashMap;

use common::{Money, OrderId, PaymentId};
use serde::{Deserialize, Serialize};

/// Outcome of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Processed,
    Failed,
}

/// One payment attempt. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
}

/// Durable state of the payments service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentsState {
    payments: HashMap<PaymentId, PaymentRecord>,
}

impl PaymentsState {
    /// Records a payment attempt.
    pub fn insert(&mut self, record: PaymentRecord) {
        self.payments.insert(record.payment_id, record);
    }

    /// Returns all payment attempts for an order.
    pub fn list_by_order(&self, order_id: OrderId) -> Vec<PaymentRecord> {
        self.payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Total number of payment records.
    pub fn len(&self) -> usize {
        self.payments.len()
    }

    /// Returns true if no payments have been recorded.
    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_by_order_filters() {
        let mut state = PaymentsState::default();
        let order_a = OrderId::new();
        let order_b = OrderId::new();

        state.insert(PaymentRecord {
            payment_id: PaymentId::new(),
            order_id: order_a,
            amount: Money::from_cents(1000),
            status: PaymentStatus::Processed,
        });
        state.insert(PaymentRecord {
            payment_id: PaymentId::new(),
            order_id: order_b,
            amount: Money::from_cents(500),
            status: PaymentStatus::Failed,
        });

        let for_a = state.list_by_order(order_a);
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].status, PaymentStatus::Processed);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&PaymentStatus::Processed).unwrap();
        assert_eq!(json, "\"PROCESSED\"");
    }
}
