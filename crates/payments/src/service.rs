//! Command handler for the payments service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{EventId, OrderId, PaymentId};
use contracts::{
    PaymentCommand, PaymentEvent, PaymentFailed, PaymentProcessed, ProcessPayment,
};
use messaging::{ConsumeError, Envelope, MessageHandler};
use storage::{TransactionalStore, process_once};

use crate::state::{PaymentRecord, PaymentStatus, PaymentsState};

/// Consumes `payments-commands` and mutates the payments store.
///
/// A declined charge is a business outcome, not an error: the attempt is
/// recorded with status FAILED and a `PaymentFailed` event is emitted in the
/// same transaction.
pub struct PaymentService<St> {
    store: St,
    /// When set, every charge is declined. The hook the demo topology and the
    /// compensation tests use to force the unhappy path.
    decline_charges: Arc<AtomicBool>,
}

impl<St> Clone for PaymentService<St>
where
    St: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            decline_charges: self.decline_charges.clone(),
        }
    }
}

impl<St> PaymentService<St>
where
    St: TransactionalStore<PaymentsState>,
{
    /// Creates a service over its transactional store.
    pub fn new(store: St) -> Self {
        Self {
            store,
            decline_charges: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Forces every subsequent charge to be declined (or not).
    pub fn set_decline_charges(&self, decline: bool) {
        self.decline_charges.store(decline, Ordering::SeqCst);
    }

    /// Returns all payment attempts recorded for an order.
    pub async fn payments_for_order(
        &self,
        order_id: OrderId,
    ) -> storage::Result<Vec<PaymentRecord>> {
        self.store
            .query(move |state| state.list_by_order(order_id))
            .await
    }

    async fn handle_process(&self, event_id: EventId, cmd: ProcessPayment) -> storage::Result<()> {
        let declined = self.decline_charges.load(Ordering::SeqCst);

        let outcome = process_once(&self.store, event_id, "ProcessPayment", move |tx| {
            let payment_id = PaymentId::new();
            let refusal = if declined {
                Some("payment declined".to_string())
            } else if cmd.amount.is_negative() {
                Some("invalid amount".to_string())
            } else {
                None
            };

            let (status, event) = match refusal {
                None => (
                    PaymentStatus::Processed,
                    PaymentEvent::Processed(PaymentProcessed {
                        order_id: cmd.order_id,
                        payment_id,
                        amount: cmd.amount,
                    }),
                ),
                Some(reason) => (
                    PaymentStatus::Failed,
                    PaymentEvent::Failed(PaymentFailed {
                        order_id: cmd.order_id,
                        reason,
                    }),
                ),
            };

            tx.state_mut().insert(PaymentRecord {
                payment_id,
                order_id: cmd.order_id,
                amount: cmd.amount,
                status,
            });
            tracing::info!(
                order_id = %cmd.order_id,
                event_type = event.event_type(),
                "charge handled"
            );
            tx.publish(event.into_envelope()?);
            Ok(())
        })
        .await?;

        if outcome.is_duplicate() {
            tracing::debug!(%event_id, "duplicate ProcessPayment discarded");
        }
        Ok(())
    }
}

#[async_trait]
impl<St> MessageHandler for PaymentService<St>
where
    St: TransactionalStore<PaymentsState>,
{
    fn name(&self) -> &'static str {
        "payments-service"
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), ConsumeError> {
        let command = PaymentCommand::from_envelope(envelope)
            .map_err(|e| ConsumeError::Poison(e.to_string()))?;
        let event_id = envelope.event_id();

        let result = match command {
            PaymentCommand::Process(cmd) => self.handle_process(event_id, cmd).await,
        };

        result.map_err(|e| ConsumeError::Transient(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use storage::{InMemoryStore, OutboxSource};

    fn service() -> PaymentService<InMemoryStore<PaymentsState>> {
        PaymentService::new(InMemoryStore::new())
    }

    fn charge_envelope(order_id: OrderId, cents: i64) -> Envelope {
        PaymentCommand::Process(ProcessPayment {
            order_id,
            amount: Money::from_cents(cents),
        })
        .into_envelope()
        .unwrap()
    }

    async fn staged_event_types(store: &InMemoryStore<PaymentsState>) -> Vec<String> {
        store
            .pending_outbox(100)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.envelope.event_type().to_string())
            .collect()
    }

    #[tokio::test]
    async fn charge_records_payment_and_emits_processed() {
        let service = service();
        let order_id = OrderId::new();

        service.handle(&charge_envelope(order_id, 2000)).await.unwrap();

        let payments = service.payments_for_order(order_id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Processed);
        assert_eq!(payments[0].amount.cents(), 2000);
        assert_eq!(staged_event_types(&service.store).await, ["PaymentProcessed"]);
    }

    #[tokio::test]
    async fn declined_charge_records_failure_and_emits_failed() {
        let service = service();
        service.set_decline_charges(true);
        let order_id = OrderId::new();

        service.handle(&charge_envelope(order_id, 2000)).await.unwrap();

        let payments = service.payments_for_order(order_id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Failed);
        assert_eq!(staged_event_types(&service.store).await, ["PaymentFailed"]);
    }

    #[tokio::test]
    async fn duplicate_charge_is_discarded() {
        let service = service();
        let order_id = OrderId::new();
        let envelope = charge_envelope(order_id, 2000);

        service.handle(&envelope).await.unwrap();
        service.handle(&envelope).await.unwrap();

        // One record, one event.
        assert_eq!(service.payments_for_order(order_id).await.unwrap().len(), 1);
        assert_eq!(staged_event_types(&service.store).await.len(), 1);
    }

    #[tokio::test]
    async fn negative_amount_is_a_domain_failure() {
        let service = service();
        let order_id = OrderId::new();

        service.handle(&charge_envelope(order_id, -5)).await.unwrap();

        let payments = service.payments_for_order(order_id).await.unwrap();
        assert_eq!(payments[0].status, PaymentStatus::Failed);
        assert_eq!(staged_event_types(&service.store).await, ["PaymentFailed"]);
    }

    #[tokio::test]
    async fn unknown_command_is_poison() {
        let service = service();
        let envelope = Envelope::new(
            messaging::topics::PAYMENTS_COMMANDS,
            "order-1",
            "RefundPayment",
            serde_json::json!({}),
        );

        let err = service.handle(&envelope).await.unwrap_err();
        assert!(matches!(err, ConsumeError::Poison(_)));
    }
}
