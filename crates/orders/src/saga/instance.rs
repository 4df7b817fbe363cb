//! Persisted saga instance.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::saga::state::SagaState;

/// A compensator for one completed forward step.
///
/// Pushed when the step's success event is consumed, popped in reverse order
/// during unwind. Adding a forward step to the saga means adding its
/// compensator variant here and a command mapping in the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Compensation {
    /// Undo an inventory reservation.
    ReleaseReservation { product_id: ProductId, quantity: u32 },
}

/// The orchestrator's bookkeeping for one order, keyed by order id.
///
/// Mutated in the same local transaction as the order status and history
/// writes it belongs with; the transition table in the orchestrator is the
/// single source of truth for how it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaInstance {
    order_id: OrderId,
    state: SagaState,
    /// Stack of compensators for completed forward steps (LIFO).
    compensations: Vec<Compensation>,
    failure_reason: Option<String>,
    started_at: DateTime<Utc>,
}

impl SagaInstance {
    /// Starts a saga for an order, awaiting its first step's outcome.
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            state: SagaState::AwaitingReservation,
            compensations: Vec::new(),
            failure_reason: None,
            started_at: Utc::now(),
        }
    }

    /// The order this saga coordinates.
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Current state.
    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Why the saga failed, if it did.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// When the saga started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Number of completed forward steps still awaiting compensation.
    pub fn pending_compensations(&self) -> usize {
        self.compensations.len()
    }

    /// Records a completed reservation and moves on to the payment step.
    pub fn advance_to_payment(&mut self, compensation: Compensation) {
        self.compensations.push(compensation);
        self.state = SagaState::AwaitingPayment;
    }

    /// Begins the unwind after a step failure.
    ///
    /// Returns the first compensator to run, in reverse completion order. If
    /// no forward step ever completed there is nothing to undo and the saga
    /// goes straight to `Rejected`.
    pub fn begin_unwind(&mut self, reason: impl Into<String>) -> Option<Compensation> {
        self.failure_reason = Some(reason.into());
        match self.compensations.pop() {
            Some(compensation) => {
                self.state = SagaState::Compensating;
                Some(compensation)
            }
            None => {
                self.state = SagaState::Rejected;
                None
            }
        }
    }

    /// Pops the next compensator after one completed.
    ///
    /// Returns `None` once the stack is empty, at which point the saga is
    /// `Rejected`.
    pub fn continue_unwind(&mut self) -> Option<Compensation> {
        match self.compensations.pop() {
            Some(compensation) => Some(compensation),
            None => {
                self.state = SagaState::Rejected;
                None
            }
        }
    }

    /// Marks the saga approved after the last forward step succeeded.
    pub fn approve(&mut self) {
        self.state = SagaState::Approved;
        self.compensations.clear();
    }

    /// Seconds elapsed since the saga started.
    pub fn elapsed_seconds(&self) -> f64 {
        (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compensation() -> Compensation {
        Compensation::ReleaseReservation {
            product_id: ProductId::new("SKU-001"),
            quantity: 2,
        }
    }

    #[test]
    fn new_saga_awaits_reservation() {
        let saga = SagaInstance::new(OrderId::new());
        assert_eq!(saga.state(), SagaState::AwaitingReservation);
        assert_eq!(saga.pending_compensations(), 0);
        assert!(saga.failure_reason().is_none());
    }

    #[test]
    fn happy_path_approves_without_compensation() {
        let mut saga = SagaInstance::new(OrderId::new());
        saga.advance_to_payment(compensation());
        assert_eq!(saga.state(), SagaState::AwaitingPayment);

        saga.approve();
        assert_eq!(saga.state(), SagaState::Approved);
        assert!(saga.state().is_terminal());
    }

    #[test]
    fn failure_with_no_completed_steps_rejects_directly() {
        let mut saga = SagaInstance::new(OrderId::new());

        let next = saga.begin_unwind("insufficient stock");
        assert!(next.is_none());
        assert_eq!(saga.state(), SagaState::Rejected);
        assert_eq!(saga.failure_reason(), Some("insufficient stock"));
    }

    #[test]
    fn failure_after_reservation_unwinds_the_stack() {
        let mut saga = SagaInstance::new(OrderId::new());
        saga.advance_to_payment(compensation());

        let next = saga.begin_unwind("payment declined");
        assert_eq!(next, Some(compensation()));
        assert_eq!(saga.state(), SagaState::Compensating);

        // The compensator completed; the stack is empty.
        assert!(saga.continue_unwind().is_none());
        assert_eq!(saga.state(), SagaState::Rejected);
    }

    #[test]
    fn compensators_pop_in_reverse_order() {
        let mut saga = SagaInstance::new(OrderId::new());
        let first = Compensation::ReleaseReservation {
            product_id: ProductId::new("SKU-001"),
            quantity: 1,
        };
        let second = Compensation::ReleaseReservation {
            product_id: ProductId::new("SKU-002"),
            quantity: 2,
        };
        saga.advance_to_payment(first.clone());
        saga.compensations.push(second.clone());

        assert_eq!(saga.begin_unwind("late failure"), Some(second));
        assert_eq!(saga.continue_unwind(), Some(first));
        assert!(saga.continue_unwind().is_none());
        assert_eq!(saga.state(), SagaState::Rejected);
    }

    #[test]
    fn serialization_roundtrip() {
        let mut saga = SagaInstance::new(OrderId::new());
        saga.advance_to_payment(compensation());

        let json = serde_json::to_string(&saga).unwrap();
        let deserialized: SagaInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(saga, deserialized);
    }
}
