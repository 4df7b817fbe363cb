//! Command handler for the inventory service.

use async_trait::async_trait;
use common::{EventId, ProductId};
use contracts::{
    CancelProductReservation, ProductCommand, ProductEvent, ProductReservationCanceled,
    ProductReservationFailed, ProductReserved, ReserveProduct,
};
use messaging::{ConsumeError, Envelope, MessageHandler};
use storage::{TransactionalStore, process_once};

use crate::state::{InventoryRecord, InventoryState};

/// Consumes `products-commands` and mutates the inventory store.
///
/// Every applied command emits exactly one outcome event (success or typed
/// failure) staged in the same transaction as the stock mutation and the
/// idempotency mark.
pub struct InventoryService<St> {
    store: St,
}

impl<St> Clone for InventoryService<St>
where
    St: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<St> InventoryService<St>
where
    St: TransactionalStore<InventoryState>,
{
    /// Creates a service over its transactional store.
    pub fn new(store: St) -> Self {
        Self { store }
    }

    /// Seeds or adjusts available stock for a product.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(&self, product_id: ProductId, available: u32) -> storage::Result<()> {
        self.store
            .with_transaction(move |tx| {
                tx.state_mut().set_stock(product_id, available);
                Ok(())
            })
            .await
    }

    /// Returns the stock record for a product.
    pub async fn stock(&self, product_id: ProductId) -> storage::Result<Option<InventoryRecord>> {
        self.store
            .query(move |state| state.record(&product_id).cloned())
            .await
    }

    async fn handle_reserve(&self, event_id: EventId, cmd: ReserveProduct) -> storage::Result<()> {
        let outcome = process_once(&self.store, event_id, "ReserveProduct", move |tx| {
            let event = match tx.state_mut().reserve(&cmd.product_id, cmd.quantity) {
                Ok(()) => ProductEvent::Reserved(ProductReserved {
                    order_id: cmd.order_id,
                    product_id: cmd.product_id,
                    quantity: cmd.quantity,
                }),
                Err(reason) => ProductEvent::ReservationFailed(ProductReservationFailed {
                    order_id: cmd.order_id,
                    product_id: cmd.product_id,
                    reason: reason.to_string(),
                }),
            };
            tracing::info!(event_type = event.event_type(), "reservation handled");
            tx.publish(event.into_envelope()?);
            Ok(())
        })
        .await?;

        if outcome.is_duplicate() {
            tracing::debug!(%event_id, "duplicate ReserveProduct discarded");
        }
        Ok(())
    }

    async fn handle_cancel(
        &self,
        event_id: EventId,
        cmd: CancelProductReservation,
    ) -> storage::Result<()> {
        let outcome = process_once(&self.store, event_id, "CancelProductReservation", move |tx| {
            tx.state_mut()
                .cancel_reservation(&cmd.product_id, cmd.quantity);
            let event = ProductEvent::ReservationCanceled(ProductReservationCanceled {
                order_id: cmd.order_id,
                product_id: cmd.product_id,
                quantity: cmd.quantity,
            });
            tx.publish(event.into_envelope()?);
            Ok(())
        })
        .await?;

        if outcome.is_duplicate() {
            tracing::debug!(%event_id, "duplicate CancelProductReservation discarded");
        }
        Ok(())
    }
}

#[async_trait]
impl<St> MessageHandler for InventoryService<St>
where
    St: TransactionalStore<InventoryState>,
{
    fn name(&self) -> &'static str {
        "inventory-service"
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), ConsumeError> {
        let command = ProductCommand::from_envelope(envelope)
            .map_err(|e| ConsumeError::Poison(e.to_string()))?;
        let event_id = envelope.event_id();

        let result = match command {
            ProductCommand::Reserve(cmd) => self.handle_reserve(event_id, cmd).await,
            ProductCommand::CancelReservation(cmd) => self.handle_cancel(event_id, cmd).await,
        };

        result.map_err(|e| ConsumeError::Transient(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use messaging::topics;
    use storage::{InMemoryStore, OutboxSource};

    fn service() -> InventoryService<InMemoryStore<InventoryState>> {
        InventoryService::new(InMemoryStore::new())
    }

    fn reserve_envelope(order_id: OrderId, sku: &str, quantity: u32) -> Envelope {
        ProductCommand::Reserve(ReserveProduct {
            order_id,
            product_id: ProductId::new(sku),
            quantity,
        })
        .into_envelope()
        .unwrap()
    }

    async fn staged_event_types(store: &InMemoryStore<InventoryState>) -> Vec<String> {
        store
            .pending_outbox(100)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.envelope.event_type().to_string())
            .collect()
    }

    #[tokio::test]
    async fn reserve_emits_reserved_and_moves_stock() {
        let service = service();
        service.set_stock(ProductId::new("SKU-001"), 10).await.unwrap();

        let envelope = reserve_envelope(OrderId::new(), "SKU-001", 2);
        service.handle(&envelope).await.unwrap();

        let record = service.stock(ProductId::new("SKU-001")).await.unwrap().unwrap();
        assert_eq!(record.available, 8);
        assert_eq!(record.reserved, 2);
        assert_eq!(staged_event_types(&service.store).await, ["ProductReserved"]);
    }

    #[tokio::test]
    async fn reserve_short_stock_emits_failure_without_mutation() {
        let service = service();
        service.set_stock(ProductId::new("SKU-001"), 2).await.unwrap();

        let envelope = reserve_envelope(OrderId::new(), "SKU-001", 5);
        service.handle(&envelope).await.unwrap();

        let record = service.stock(ProductId::new("SKU-001")).await.unwrap().unwrap();
        assert_eq!(record.available, 2);
        assert_eq!(record.reserved, 0);
        assert_eq!(
            staged_event_types(&service.store).await,
            ["ProductReservationFailed"]
        );
    }

    #[tokio::test]
    async fn duplicate_command_is_discarded() {
        let service = service();
        service.set_stock(ProductId::new("SKU-001"), 10).await.unwrap();

        let envelope = reserve_envelope(OrderId::new(), "SKU-001", 2);
        service.handle(&envelope).await.unwrap();
        service.handle(&envelope).await.unwrap();

        let record = service.stock(ProductId::new("SKU-001")).await.unwrap().unwrap();
        assert_eq!(record.available, 8);
        assert_eq!(record.reserved, 2);
        // One outcome event, not two.
        assert_eq!(staged_event_types(&service.store).await.len(), 1);
    }

    #[tokio::test]
    async fn cancel_restores_the_reserve_delta() {
        let service = service();
        service.set_stock(ProductId::new("SKU-001"), 10).await.unwrap();
        let order_id = OrderId::new();

        service
            .handle(&reserve_envelope(order_id, "SKU-001", 4))
            .await
            .unwrap();

        let cancel = ProductCommand::CancelReservation(CancelProductReservation {
            order_id,
            product_id: ProductId::new("SKU-001"),
            quantity: 4,
        })
        .into_envelope()
        .unwrap();
        service.handle(&cancel).await.unwrap();

        let record = service.stock(ProductId::new("SKU-001")).await.unwrap().unwrap();
        assert_eq!(record.available, 10);
        assert_eq!(record.reserved, 0);
        assert_eq!(
            staged_event_types(&service.store).await,
            ["ProductReserved", "ProductReservationCanceled"]
        );
    }

    #[tokio::test]
    async fn malformed_command_is_poison() {
        let service = service();
        let envelope = Envelope::new(
            topics::PRODUCTS_COMMANDS,
            "order-1",
            "ReserveProduct",
            serde_json::json!({"quantity": "many"}),
        );

        let err = service.handle(&envelope).await.unwrap_err();
        assert!(matches!(err, ConsumeError::Poison(_)));
    }

    #[tokio::test]
    async fn store_outage_is_transient() {
        let service = service();
        service.set_stock(ProductId::new("SKU-001"), 10).await.unwrap();
        service.store.set_fail_next_commit(true);

        let envelope = reserve_envelope(OrderId::new(), "SKU-001", 2);
        let err = service.handle(&envelope).await.unwrap_err();
        assert!(matches!(err, ConsumeError::Transient(_)));

        // Redelivery succeeds once the store is back.
        service.handle(&envelope).await.unwrap();
        let record = service.stock(ProductId::new("SKU-001")).await.unwrap().unwrap();
        assert_eq!(record.available, 8);
    }
}
