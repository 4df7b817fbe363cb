//! Order status machine.

use serde::{Deserialize, Serialize};

/// Externally visible order statuses.
///
/// The `Order` record itself only ever holds `Created`, `Approved` or
/// `Rejected`; `ReservationCanceled` appears exclusively as a history
/// snapshot while compensation is pending.
///
/// ```text
/// CREATED ──┬────────────────────────────► APPROVED
///           └──(RESERVATION_CANCELED)────► REJECTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order accepted and persisted; the saga is in flight.
    #[default]
    Created,

    /// History-only marker: a reservation rollback was requested.
    ReservationCanceled,

    /// Happy end: reservation and payment both succeeded (terminal).
    Approved,

    /// A step failed; completed steps were compensated (terminal).
    Rejected,
}

impl OrderStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Approved | OrderStatus::Rejected)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::ReservationCanceled => "RESERVATION_CANCELED",
            OrderStatus::Approved => "APPROVED",
            OrderStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
