//! Event-driven saga transitions.
//!
//! Transition table (preconditions are checked against the persisted saga
//! instance; an event arriving in any other state is consumed, marked and
//! ignored, which is also how redeliveries past a terminal state resolve):
//!
//! | event consumed             | precondition         | action                                              | next state |
//! |----------------------------|----------------------|-----------------------------------------------------|------------|
//! | OrderCreated               | no saga yet          | history CREATED, emit ReserveProduct                | AWAITING_RESERVATION |
//! | ProductReserved            | AWAITING_RESERVATION | push compensator, emit ProcessPayment               | AWAITING_PAYMENT |
//! | ProductReservationFailed   | AWAITING_RESERVATION | order REJECTED, history REJECTED                    | REJECTED |
//! | PaymentProcessed           | AWAITING_PAYMENT     | order APPROVED, history APPROVED                    | APPROVED |
//! | PaymentFailed              | AWAITING_PAYMENT     | history RESERVATION_CANCELED, emit CancelProductReservation | COMPENSATING |
//! | ProductReservationCanceled | COMPENSATING         | pop next compensator or: order REJECTED, history REJECTED | COMPENSATING / REJECTED |

use async_trait::async_trait;
use common::EventId;
use contracts::{
    CancelProductReservation, OrderCreated, OrderEvent, PaymentCommand, PaymentEvent,
    PaymentFailed, PaymentProcessed, ProcessPayment, ProductCommand, ProductEvent,
    ProductReservationCanceled, ProductReservationFailed, ProductReserved, ReserveProduct,
};
use messaging::{ConsumeError, Envelope, MessageHandler, topics};
use storage::{Transaction, TransactionalStore, process_once};

use crate::saga::instance::{Compensation, SagaInstance};
use crate::saga::state::SagaState;
use crate::state::OrdersState;
use crate::status::OrderStatus;

/// Consumes the three event channels and drives the saga state machine.
///
/// The orchestrator shares the orders service's transactional store: every
/// transition mutates the order, the history and the saga instance and stages
/// its outbound commands in one local transaction, guarded by the idempotency
/// store.
pub struct SagaOrchestrator<St> {
    store: St,
}

impl<St> Clone for SagaOrchestrator<St>
where
    St: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

/// Emits the given compensator (recording its history marker), or finishes
/// the unwind when there is none left.
fn apply_unwind_step(
    tx: &mut Transaction<OrdersState>,
    saga: SagaInstance,
    next: Option<Compensation>,
) -> storage::Result<()> {
    let order_id = saga.order_id();
    match next {
        Some(Compensation::ReleaseReservation {
            product_id,
            quantity,
        }) => {
            let command = ProductCommand::CancelReservation(CancelProductReservation {
                order_id,
                product_id,
                quantity,
            })
            .into_envelope()?;
            {
                let state = tx.state_mut();
                state.append_history(order_id, OrderStatus::ReservationCanceled);
                state.save_saga(saga);
            }
            tx.publish(command);
            tracing::info!(%order_id, "reservation rollback requested");
        }
        None => {
            let elapsed = saga.elapsed_seconds();
            let reason = saga.failure_reason().unwrap_or("unknown").to_string();
            let state = tx.state_mut();
            if !state.set_status(order_id, OrderStatus::Rejected) {
                tracing::warn!(%order_id, "order record missing while rejecting");
            }
            state.append_history(order_id, OrderStatus::Rejected);
            state.save_saga(saga);
            metrics::counter!("saga_rejected_total").increment(1);
            metrics::histogram!("saga_duration_seconds").record(elapsed);
            tracing::info!(%order_id, %reason, "saga rejected");
        }
    }
    Ok(())
}

impl<St> SagaOrchestrator<St>
where
    St: TransactionalStore<OrdersState>,
{
    /// Creates an orchestrator over the orders store.
    pub fn new(store: St) -> Self {
        Self { store }
    }

    async fn on_order_created(&self, event_id: EventId, data: OrderCreated) -> storage::Result<()> {
        let outcome = process_once(&self.store, event_id, "OrderCreated", move |tx| {
            if tx.state().saga(data.order_id).is_some() {
                tracing::debug!(order_id = %data.order_id, "saga already started, event ignored");
                return Ok(());
            }
            if tx.state().order(data.order_id).is_none() {
                tracing::warn!(order_id = %data.order_id, "OrderCreated for unknown order ignored");
                return Ok(());
            }

            let command = ProductCommand::Reserve(ReserveProduct {
                order_id: data.order_id,
                product_id: data.product_id.clone(),
                quantity: data.quantity,
            })
            .into_envelope()?;
            {
                let state = tx.state_mut();
                state.append_history(data.order_id, OrderStatus::Created);
                state.save_saga(SagaInstance::new(data.order_id));
            }
            tx.publish(command);
            metrics::counter!("saga_started_total").increment(1);
            tracing::info!(order_id = %data.order_id, "saga started, reservation requested");
            Ok(())
        })
        .await?;

        if outcome.is_duplicate() {
            tracing::debug!(%event_id, "duplicate OrderCreated discarded");
        }
        Ok(())
    }

    async fn on_product_reserved(
        &self,
        event_id: EventId,
        data: ProductReserved,
    ) -> storage::Result<()> {
        let outcome = process_once(&self.store, event_id, "ProductReserved", move |tx| {
            let Some(saga) = tx.state().saga(data.order_id).cloned() else {
                tracing::warn!(order_id = %data.order_id, "ProductReserved without saga ignored");
                return Ok(());
            };
            if saga.state() != SagaState::AwaitingReservation {
                tracing::debug!(
                    order_id = %data.order_id,
                    state = %saga.state(),
                    "ProductReserved ignored in current state"
                );
                return Ok(());
            }
            let Some(order) = tx.state().order(data.order_id).cloned() else {
                tracing::warn!(order_id = %data.order_id, "order record missing, event ignored");
                return Ok(());
            };

            let command = PaymentCommand::Process(ProcessPayment {
                order_id: data.order_id,
                amount: order.total,
            })
            .into_envelope()?;

            let mut saga = saga;
            saga.advance_to_payment(Compensation::ReleaseReservation {
                product_id: data.product_id.clone(),
                quantity: data.quantity,
            });
            tx.state_mut().save_saga(saga);
            tx.publish(command);
            tracing::info!(order_id = %data.order_id, amount = %order.total, "payment requested");
            Ok(())
        })
        .await?;

        if outcome.is_duplicate() {
            tracing::debug!(%event_id, "duplicate ProductReserved discarded");
        }
        Ok(())
    }

    async fn on_reservation_failed(
        &self,
        event_id: EventId,
        data: ProductReservationFailed,
    ) -> storage::Result<()> {
        let outcome = process_once(&self.store, event_id, "ProductReservationFailed", move |tx| {
            let Some(mut saga) = tx.state().saga(data.order_id).cloned() else {
                tracing::warn!(order_id = %data.order_id, "failure event without saga ignored");
                return Ok(());
            };
            if saga.state() != SagaState::AwaitingReservation {
                tracing::debug!(
                    order_id = %data.order_id,
                    state = %saga.state(),
                    "ProductReservationFailed ignored in current state"
                );
                return Ok(());
            }

            // No forward step completed, so there is nothing to undo.
            let next = saga.begin_unwind(data.reason.clone());
            apply_unwind_step(tx, saga, next)
        })
        .await?;

        if outcome.is_duplicate() {
            tracing::debug!(%event_id, "duplicate ProductReservationFailed discarded");
        }
        Ok(())
    }

    async fn on_payment_processed(
        &self,
        event_id: EventId,
        data: PaymentProcessed,
    ) -> storage::Result<()> {
        let outcome = process_once(&self.store, event_id, "PaymentProcessed", move |tx| {
            let Some(mut saga) = tx.state().saga(data.order_id).cloned() else {
                tracing::warn!(order_id = %data.order_id, "PaymentProcessed without saga ignored");
                return Ok(());
            };
            if saga.state() != SagaState::AwaitingPayment {
                tracing::debug!(
                    order_id = %data.order_id,
                    state = %saga.state(),
                    "PaymentProcessed ignored in current state"
                );
                return Ok(());
            }

            saga.approve();
            let elapsed = saga.elapsed_seconds();
            let state = tx.state_mut();
            if !state.set_status(data.order_id, OrderStatus::Approved) {
                tracing::warn!(order_id = %data.order_id, "order record missing while approving");
            }
            state.append_history(data.order_id, OrderStatus::Approved);
            state.save_saga(saga);
            metrics::counter!("saga_approved_total").increment(1);
            metrics::histogram!("saga_duration_seconds").record(elapsed);
            tracing::info!(order_id = %data.order_id, payment_id = %data.payment_id, "saga approved");
            Ok(())
        })
        .await?;

        if outcome.is_duplicate() {
            tracing::debug!(%event_id, "duplicate PaymentProcessed discarded");
        }
        Ok(())
    }

    async fn on_payment_failed(
        &self,
        event_id: EventId,
        data: PaymentFailed,
    ) -> storage::Result<()> {
        let outcome = process_once(&self.store, event_id, "PaymentFailed", move |tx| {
            let Some(mut saga) = tx.state().saga(data.order_id).cloned() else {
                tracing::warn!(order_id = %data.order_id, "PaymentFailed without saga ignored");
                return Ok(());
            };
            if saga.state() != SagaState::AwaitingPayment {
                tracing::debug!(
                    order_id = %data.order_id,
                    state = %saga.state(),
                    "PaymentFailed ignored in current state"
                );
                return Ok(());
            }

            // Unwind completed steps in reverse order, starting with the
            // reservation.
            let next = saga.begin_unwind(data.reason.clone());
            apply_unwind_step(tx, saga, next)
        })
        .await?;

        if outcome.is_duplicate() {
            tracing::debug!(%event_id, "duplicate PaymentFailed discarded");
        }
        Ok(())
    }

    async fn on_reservation_canceled(
        &self,
        event_id: EventId,
        data: ProductReservationCanceled,
    ) -> storage::Result<()> {
        let outcome = process_once(&self.store, event_id, "ProductReservationCanceled", move |tx| {
            let Some(mut saga) = tx.state().saga(data.order_id).cloned() else {
                tracing::warn!(order_id = %data.order_id, "cancel event without saga ignored");
                return Ok(());
            };
            if saga.state() != SagaState::Compensating {
                // Covers redelivery after the order is already REJECTED:
                // consumed and marked, no re-append, no re-transition.
                tracing::debug!(
                    order_id = %data.order_id,
                    state = %saga.state(),
                    "ProductReservationCanceled ignored in current state"
                );
                return Ok(());
            }

            let next = saga.continue_unwind();
            apply_unwind_step(tx, saga, next)
        })
        .await?;

        if outcome.is_duplicate() {
            tracing::debug!(%event_id, "duplicate ProductReservationCanceled discarded");
        }
        Ok(())
    }
}

#[async_trait]
impl<St> MessageHandler for SagaOrchestrator<St>
where
    St: TransactionalStore<OrdersState>,
{
    fn name(&self) -> &'static str {
        "saga-orchestrator"
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), ConsumeError> {
        let event_id = envelope.event_id();
        let poison = |e: contracts::MessageError| ConsumeError::Poison(e.to_string());

        let result = match envelope.topic.as_str() {
            topics::ORDERS_EVENTS => match OrderEvent::from_envelope(envelope).map_err(poison)? {
                OrderEvent::Created(data) => self.on_order_created(event_id, data).await,
            },
            topics::PRODUCTS_EVENTS => {
                match ProductEvent::from_envelope(envelope).map_err(poison)? {
                    ProductEvent::Reserved(data) => {
                        self.on_product_reserved(event_id, data).await
                    }
                    ProductEvent::ReservationFailed(data) => {
                        self.on_reservation_failed(event_id, data).await
                    }
                    ProductEvent::ReservationCanceled(data) => {
                        self.on_reservation_canceled(event_id, data).await
                    }
                }
            }
            topics::PAYMENTS_EVENTS => {
                match PaymentEvent::from_envelope(envelope).map_err(poison)? {
                    PaymentEvent::Processed(data) => {
                        self.on_payment_processed(event_id, data).await
                    }
                    PaymentEvent::Failed(data) => self.on_payment_failed(event_id, data).await,
                }
            }
            other => {
                return Err(ConsumeError::Poison(format!(
                    "unexpected topic `{other}` for the orchestrator"
                )));
            }
        };

        result.map_err(|e| ConsumeError::Transient(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CustomerId, Money, OrderId, ProductId};
    use storage::{InMemoryStore, OutboxSource};

    use crate::record::Order;

    type Store = InMemoryStore<OrdersState>;

    fn setup() -> (SagaOrchestrator<Store>, Store) {
        let store: Store = InMemoryStore::new();
        (SagaOrchestrator::new(store.clone()), store)
    }

    fn order(order_id: OrderId) -> Order {
        Order {
            order_id,
            customer_id: CustomerId::new(),
            product_id: ProductId::new("SKU-001"),
            quantity: 2,
            total: Money::from_cents(2000),
            status: OrderStatus::Created,
        }
    }

    async fn seed_order(store: &Store, order: Order) {
        store
            .with_transaction(move |tx| {
                tx.state_mut().save_order(order);
                Ok(())
            })
            .await
            .unwrap();
    }

    fn created_envelope(order: &Order) -> Envelope {
        OrderEvent::Created(OrderCreated {
            order_id: order.order_id,
            customer_id: order.customer_id,
            product_id: order.product_id.clone(),
            quantity: order.quantity,
            unit_price: Money::from_cents(order.total.cents() / order.quantity as i64),
        })
        .into_envelope()
        .unwrap()
    }

    fn reserved_envelope(order_id: OrderId) -> Envelope {
        ProductEvent::Reserved(ProductReserved {
            order_id,
            product_id: ProductId::new("SKU-001"),
            quantity: 2,
        })
        .into_envelope()
        .unwrap()
    }

    fn payment_failed_envelope(order_id: OrderId) -> Envelope {
        PaymentEvent::Failed(PaymentFailed {
            order_id,
            reason: "payment declined".to_string(),
        })
        .into_envelope()
        .unwrap()
    }

    fn canceled_envelope(order_id: OrderId) -> Envelope {
        ProductEvent::ReservationCanceled(ProductReservationCanceled {
            order_id,
            product_id: ProductId::new("SKU-001"),
            quantity: 2,
        })
        .into_envelope()
        .unwrap()
    }

    async fn emitted_commands(store: &Store) -> Vec<String> {
        store
            .pending_outbox(100)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.envelope.event_type().to_string())
            .collect()
    }

    async fn saga_state(store: &Store, order_id: OrderId) -> Option<SagaState> {
        store
            .query(move |s| s.saga(order_id).map(|saga| saga.state()))
            .await
            .unwrap()
    }

    async fn history(store: &Store, order_id: OrderId) -> Vec<OrderStatus> {
        store
            .query(move |s| {
                s.history_for(order_id)
                    .into_iter()
                    .map(|e| e.status)
                    .collect()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn order_created_starts_saga_and_requests_reservation() {
        let (orchestrator, store) = setup();
        let order = order(OrderId::new());
        let order_id = order.order_id;
        seed_order(&store, order.clone()).await;

        orchestrator.handle(&created_envelope(&order)).await.unwrap();

        assert_eq!(
            saga_state(&store, order_id).await,
            Some(SagaState::AwaitingReservation)
        );
        assert_eq!(history(&store, order_id).await, [OrderStatus::Created]);
        assert_eq!(emitted_commands(&store).await, ["ReserveProduct"]);
    }

    #[tokio::test]
    async fn product_reserved_requests_payment_for_order_total() {
        let (orchestrator, store) = setup();
        let order = order(OrderId::new());
        let order_id = order.order_id;
        seed_order(&store, order.clone()).await;

        orchestrator.handle(&created_envelope(&order)).await.unwrap();
        orchestrator.handle(&reserved_envelope(order_id)).await.unwrap();

        assert_eq!(
            saga_state(&store, order_id).await,
            Some(SagaState::AwaitingPayment)
        );
        assert_eq!(
            emitted_commands(&store).await,
            ["ReserveProduct", "ProcessPayment"]
        );

        // The charge is for the order's total.
        let pending = store.pending_outbox(10).await.unwrap();
        let charge = PaymentCommand::from_envelope(&pending[1].envelope).unwrap();
        let PaymentCommand::Process(data) = charge;
        assert_eq!(data.amount.cents(), 2000);
    }

    #[tokio::test]
    async fn reservation_failure_rejects_without_compensation() {
        let (orchestrator, store) = setup();
        let order = order(OrderId::new());
        let order_id = order.order_id;
        seed_order(&store, order.clone()).await;
        orchestrator.handle(&created_envelope(&order)).await.unwrap();

        let failed = ProductEvent::ReservationFailed(ProductReservationFailed {
            order_id,
            product_id: ProductId::new("SKU-001"),
            reason: "insufficient stock".to_string(),
        })
        .into_envelope()
        .unwrap();
        orchestrator.handle(&failed).await.unwrap();

        assert_eq!(saga_state(&store, order_id).await, Some(SagaState::Rejected));
        assert_eq!(
            history(&store, order_id).await,
            [OrderStatus::Created, OrderStatus::Rejected]
        );
        let status = store
            .query(move |s| s.order(order_id).map(|o| o.status))
            .await
            .unwrap();
        assert_eq!(status, Some(OrderStatus::Rejected));
        // Only the original reservation request was ever emitted.
        assert_eq!(emitted_commands(&store).await, ["ReserveProduct"]);
    }

    #[tokio::test]
    async fn payment_processed_approves_the_order() {
        let (orchestrator, store) = setup();
        let order = order(OrderId::new());
        let order_id = order.order_id;
        seed_order(&store, order.clone()).await;
        orchestrator.handle(&created_envelope(&order)).await.unwrap();
        orchestrator.handle(&reserved_envelope(order_id)).await.unwrap();

        let processed = PaymentEvent::Processed(PaymentProcessed {
            order_id,
            payment_id: common::PaymentId::new(),
            amount: Money::from_cents(2000),
        })
        .into_envelope()
        .unwrap();
        orchestrator.handle(&processed).await.unwrap();

        assert_eq!(saga_state(&store, order_id).await, Some(SagaState::Approved));
        assert_eq!(
            history(&store, order_id).await,
            [OrderStatus::Created, OrderStatus::Approved]
        );
        let status = store
            .query(move |s| s.order(order_id).map(|o| o.status))
            .await
            .unwrap();
        assert_eq!(status, Some(OrderStatus::Approved));
    }

    #[tokio::test]
    async fn payment_failure_requests_compensation_then_rejects() {
        let (orchestrator, store) = setup();
        let order = order(OrderId::new());
        let order_id = order.order_id;
        seed_order(&store, order.clone()).await;
        orchestrator.handle(&created_envelope(&order)).await.unwrap();
        orchestrator.handle(&reserved_envelope(order_id)).await.unwrap();

        orchestrator
            .handle(&payment_failed_envelope(order_id))
            .await
            .unwrap();

        assert_eq!(
            saga_state(&store, order_id).await,
            Some(SagaState::Compensating)
        );
        assert_eq!(
            emitted_commands(&store).await,
            ["ReserveProduct", "ProcessPayment", "CancelProductReservation"]
        );
        assert_eq!(
            history(&store, order_id).await,
            [OrderStatus::Created, OrderStatus::ReservationCanceled]
        );

        orchestrator.handle(&canceled_envelope(order_id)).await.unwrap();

        assert_eq!(saga_state(&store, order_id).await, Some(SagaState::Rejected));
        assert_eq!(
            history(&store, order_id).await,
            [
                OrderStatus::Created,
                OrderStatus::ReservationCanceled,
                OrderStatus::Rejected
            ]
        );
        let reason = store
            .query(move |s| {
                s.saga(order_id)
                    .and_then(|saga| saga.failure_reason().map(str::to_string))
            })
            .await
            .unwrap();
        assert_eq!(reason.as_deref(), Some("payment declined"));
    }

    #[tokio::test]
    async fn duplicate_product_reserved_emits_no_second_payment_command() {
        let (orchestrator, store) = setup();
        let order = order(OrderId::new());
        let order_id = order.order_id;
        seed_order(&store, order.clone()).await;
        orchestrator.handle(&created_envelope(&order)).await.unwrap();

        let reserved = reserved_envelope(order_id);
        orchestrator.handle(&reserved).await.unwrap();
        orchestrator.handle(&reserved).await.unwrap();

        assert_eq!(
            emitted_commands(&store).await,
            ["ReserveProduct", "ProcessPayment"]
        );
        assert_eq!(
            saga_state(&store, order_id).await,
            Some(SagaState::AwaitingPayment)
        );
    }

    #[tokio::test]
    async fn fresh_event_in_wrong_state_is_consumed_and_ignored() {
        let (orchestrator, store) = setup();
        let order = order(OrderId::new());
        let order_id = order.order_id;
        seed_order(&store, order.clone()).await;
        orchestrator.handle(&created_envelope(&order)).await.unwrap();

        // A payment event while still awaiting the reservation outcome.
        let premature = PaymentEvent::Processed(PaymentProcessed {
            order_id,
            payment_id: common::PaymentId::new(),
            amount: Money::from_cents(2000),
        })
        .into_envelope()
        .unwrap();
        orchestrator.handle(&premature).await.unwrap();

        assert_eq!(
            saga_state(&store, order_id).await,
            Some(SagaState::AwaitingReservation)
        );
        assert!(store.is_processed(premature.event_id()).await.unwrap());
    }

    #[tokio::test]
    async fn canceled_redelivered_after_rejection_changes_nothing() {
        let (orchestrator, store) = setup();
        let order = order(OrderId::new());
        let order_id = order.order_id;
        seed_order(&store, order.clone()).await;
        orchestrator.handle(&created_envelope(&order)).await.unwrap();
        orchestrator.handle(&reserved_envelope(order_id)).await.unwrap();
        orchestrator
            .handle(&payment_failed_envelope(order_id))
            .await
            .unwrap();
        orchestrator.handle(&canceled_envelope(order_id)).await.unwrap();

        let before = history(&store, order_id).await;

        // A second cancel event with a fresh event id, past the terminal
        // state: consumed, marked, no re-append, no re-transition.
        orchestrator.handle(&canceled_envelope(order_id)).await.unwrap();

        assert_eq!(history(&store, order_id).await, before);
        assert_eq!(saga_state(&store, order_id).await, Some(SagaState::Rejected));
    }

    #[tokio::test]
    async fn unexpected_topic_is_poison() {
        let (orchestrator, _) = setup();
        let stray = Envelope::new(
            topics::PRODUCTS_COMMANDS,
            "order-1",
            "ReserveProduct",
            serde_json::json!({}),
        );

        let err = orchestrator.handle(&stray).await.unwrap_err();
        assert!(matches!(err, ConsumeError::Poison(_)));
    }

    #[tokio::test]
    async fn malformed_event_is_poison() {
        let (orchestrator, _) = setup();
        let garbage = Envelope::new(
            topics::ORDERS_EVENTS,
            "order-1",
            "OrderCreated",
            serde_json::json!({"order_id": 42}),
        );

        let err = orchestrator.handle(&garbage).await.unwrap_err();
        assert!(matches!(err, ConsumeError::Poison(_)));
    }
}
