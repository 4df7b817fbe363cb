//! Inventory records and stock arithmetic.

use std::collections::HashMap;

use common::ProductId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a reservation could not be made.
///
/// These are business failures: they surface as a typed failure event, never
/// as a transport error.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// Not enough stock available.
    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: u32, requested: u32 },

    /// The product is not known to this service.
    #[error("unknown product: {0}")]
    UnknownProduct(ProductId),
}

/// Stock bookkeeping for one product.
///
/// Invariant: `available + reserved` is conserved across a reserve/cancel
/// pair — a successful reservation moves exactly `quantity` from available to
/// reserved, and a cancellation moves it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_id: ProductId,
    pub available: u32,
    pub reserved: u32,
}

/// Durable state of the inventory service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryState {
    products: HashMap<ProductId, InventoryRecord>,
}

impl InventoryState {
    /// Sets the available stock for a product, creating the record if needed.
    /// Reserved stock is untouched.
    pub fn set_stock(&mut self, product_id: ProductId, available: u32) {
        self.products
            .entry(product_id.clone())
            .and_modify(|record| record.available = available)
            .or_insert(InventoryRecord {
                product_id,
                available,
                reserved: 0,
            });
    }

    /// Returns the record for a product, if known.
    pub fn record(&self, product_id: &ProductId) -> Option<&InventoryRecord> {
        self.products.get(product_id)
    }

    /// Moves `quantity` from available to reserved.
    pub fn reserve(
        &mut self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), ReservationError> {
        let record = self
            .products
            .get_mut(product_id)
            .ok_or_else(|| ReservationError::UnknownProduct(product_id.clone()))?;

        if record.available < quantity {
            return Err(ReservationError::InsufficientStock {
                available: record.available,
                requested: quantity,
            });
        }

        record.available -= quantity;
        record.reserved += quantity;
        Ok(())
    }

    /// Moves `quantity` back from reserved to available.
    ///
    /// Effect-level idempotency is guaranteed by the caller's idempotency
    /// store, not here; a cancellation exceeding what is reserved clamps to
    /// zero and is logged.
    pub fn cancel_reservation(&mut self, product_id: &ProductId, quantity: u32) {
        let Some(record) = self.products.get_mut(product_id) else {
            tracing::warn!(product_id = %product_id, "cancel for unknown product ignored");
            return;
        };

        let moved = record.reserved.min(quantity);
        if moved < quantity {
            tracing::warn!(
                product_id = %product_id,
                reserved = record.reserved,
                requested = quantity,
                "cancel exceeds reserved stock, clamping"
            );
        }
        record.reserved -= moved;
        record.available += moved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(product: &str, available: u32) -> InventoryState {
        let mut state = InventoryState::default();
        state.set_stock(ProductId::new(product), available);
        state
    }

    #[test]
    fn reserve_moves_stock() {
        let mut state = state_with("SKU-001", 10);
        let sku = ProductId::new("SKU-001");

        state.reserve(&sku, 2).unwrap();

        let record = state.record(&sku).unwrap();
        assert_eq!(record.available, 8);
        assert_eq!(record.reserved, 2);
    }

    #[test]
    fn reserve_fails_when_short() {
        let mut state = state_with("SKU-001", 2);
        let sku = ProductId::new("SKU-001");

        let err = state.reserve(&sku, 5).unwrap_err();
        assert!(matches!(
            err,
            ReservationError::InsufficientStock {
                available: 2,
                requested: 5
            }
        ));

        // Nothing moved.
        let record = state.record(&sku).unwrap();
        assert_eq!(record.available, 2);
        assert_eq!(record.reserved, 0);
    }

    #[test]
    fn reserve_unknown_product_fails() {
        let mut state = InventoryState::default();
        let err = state.reserve(&ProductId::new("SKU-404"), 1).unwrap_err();
        assert!(matches!(err, ReservationError::UnknownProduct(_)));
    }

    #[test]
    fn reserve_cancel_pair_conserves_totals() {
        let mut state = state_with("SKU-001", 10);
        let sku = ProductId::new("SKU-001");

        let before = {
            let r = state.record(&sku).unwrap();
            r.available + r.reserved
        };

        state.reserve(&sku, 3).unwrap();
        state.cancel_reservation(&sku, 3);

        let record = state.record(&sku).unwrap();
        assert_eq!(record.available + record.reserved, before);
        assert_eq!(record.available, 10);
        assert_eq!(record.reserved, 0);
    }

    #[test]
    fn cancel_clamps_to_reserved() {
        let mut state = state_with("SKU-001", 10);
        let sku = ProductId::new("SKU-001");

        state.reserve(&sku, 2).unwrap();
        state.cancel_reservation(&sku, 5);

        let record = state.record(&sku).unwrap();
        assert_eq!(record.available, 10);
        assert_eq!(record.reserved, 0);
    }
}
