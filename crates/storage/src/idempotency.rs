//! Idempotent consumption support.
//!
//! Every consumer marks an event id as processed inside the same transaction
//! as the effect the event triggers. At most one mark per event id exists per
//! store; its presence is the sole authority for "already handled".

use chrono::{DateTime, Utc};
use common::EventId;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::tx::{ServiceState, Transaction, TransactionalStore};

/// Durable record of a processed inbound event.
///
/// Written atomically with the business effect it guards, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEventRecord {
    /// The event's unique id.
    pub event_id: EventId,
    /// The event's wire type name, kept for diagnostics.
    pub event_type: String,
    /// When the event was processed.
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEventRecord {
    /// Creates a record stamped with the current time.
    pub fn new(event_id: EventId, event_type: &str) -> Self {
        Self {
            event_id,
            event_type: event_type.to_string(),
            processed_at: Utc::now(),
        }
    }
}

/// Outcome of an idempotency-guarded consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied<T> {
    /// First delivery: the effect committed with value `T`.
    First(T),
    /// The event was seen before; nothing changed. This is success.
    Duplicate,
}

impl<T> Applied<T> {
    /// Returns true if the event was discarded as a duplicate.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Applied::Duplicate)
    }
}

/// Applies an event's effect exactly once per store.
///
/// Checks the read-committed fast path, then runs `f` in a transaction with
/// the idempotency mark staged first. A commit-time mark conflict (a raced
/// redelivery) is reported as [`Applied::Duplicate`], not as an error.
pub async fn process_once<S, St, T, F>(
    store: &St,
    event_id: EventId,
    event_type: &str,
    f: F,
) -> Result<Applied<T>>
where
    S: ServiceState,
    St: TransactionalStore<S>,
    T: Send + 'static,
    F: FnOnce(&mut Transaction<S>) -> Result<T> + Send + 'static,
{
    if store.is_processed(event_id).await? {
        metrics::counter!("events_duplicate_discarded_total").increment(1);
        return Ok(Applied::Duplicate);
    }

    let event_type = event_type.to_string();
    let result = store
        .with_transaction(move |tx| {
            tx.mark_processed(event_id, &event_type);
            f(tx)
        })
        .await;

    match result {
        Ok(value) => Ok(Applied::First(value)),
        Err(StoreError::DuplicateEvent(_)) => {
            metrics::counter!("events_duplicate_discarded_total").increment(1);
            Ok(Applied::Duplicate)
        }
        Err(e) => Err(e),
    }
}
