//! Bus and consumer error types.

use thiserror::Error;

/// Errors raised by the bus itself.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus could not accept or deliver a message right now.
    #[error("bus unavailable: {0}")]
    Unavailable(String),

    /// A message was published to a topic nobody declared.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
}

/// Outcome classification a handler reports for a failed consumption.
///
/// The distinction drives the bus's retry behavior: transient failures leave
/// the message unacknowledged so it is redelivered later, poison messages go
/// to the dead-letter queue and are never retried.
#[derive(Debug, Error)]
pub enum ConsumeError {
    /// Infrastructure hiccup; the local transaction aborted and nothing
    /// committed. Redelivery is safe because handlers are idempotent.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Malformed payload or unknown event type; retrying can never succeed.
    #[error("poison message: {0}")]
    Poison(String),
}
