use common::EventId;
use thiserror::Error;

/// Errors that can occur when interacting with a transactional store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An idempotency mark for this event already exists. The transaction
    /// rolled back; the caller should treat the event as already handled.
    #[error("event {0} already processed")]
    DuplicateEvent(EventId),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store could not be reached; nothing committed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
