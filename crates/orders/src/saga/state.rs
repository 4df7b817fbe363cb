//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a saga instance.
///
/// State transitions:
/// ```text
/// AWAITING_RESERVATION ──┬──► AWAITING_PAYMENT ──┬──► APPROVED
///                        │                       └──► COMPENSATING ──► REJECTED
///                        └──► REJECTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaState {
    /// Waiting for the inventory service's reservation outcome.
    AwaitingReservation,

    /// Reservation succeeded; waiting for the payment outcome.
    AwaitingPayment,

    /// A step failed; compensators are being popped off the stack.
    Compensating,

    /// All forward steps completed (terminal).
    Approved,

    /// Unwound after a failure (terminal).
    Rejected,
}

impl SagaState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Approved | SagaState::Rejected)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::AwaitingReservation => "AWAITING_RESERVATION",
            SagaState::AwaitingPayment => "AWAITING_PAYMENT",
            SagaState::Compensating => "COMPENSATING",
            SagaState::Approved => "APPROVED",
            SagaState::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
