//! The unit of work and the transactional store contract.

use async_trait::async_trait;
use common::EventId;
use messaging::Envelope;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::idempotency::ProcessedEventRecord;
use crate::outbox::OutboxSource;

/// The durable state a service keeps in its transactional store.
///
/// Implemented automatically for any plain data type; each service defines
/// one such type holding its tables.
pub trait ServiceState:
    Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> ServiceState for T where
    T: Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// An open transaction: a working copy of the service state plus staged
/// outbound envelopes and idempotency marks.
///
/// Nothing a transaction does is visible until the store commits it; if the
/// closure returns an error, every staged mutation, envelope and mark is
/// discarded together.
pub struct Transaction<S> {
    state: S,
    marks: Vec<ProcessedEventRecord>,
    outbox: Vec<Envelope>,
}

impl<S> Transaction<S> {
    pub(crate) fn new(state: S) -> Self {
        Self {
            state,
            marks: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Read access to the working copy of the state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Mutable access to the working copy of the state.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Stages an idempotency mark for an inbound event.
    ///
    /// The mark commits with the business effect. If another transaction
    /// already committed a mark for the same event id, the commit fails with
    /// [`StoreError::DuplicateEvent`](crate::StoreError::DuplicateEvent) and
    /// the effect is discarded — which is how a raced redelivery is resolved.
    pub fn mark_processed(&mut self, event_id: EventId, event_type: &str) {
        self.marks.push(ProcessedEventRecord::new(event_id, event_type));
    }

    /// Stages an outbound envelope.
    ///
    /// The envelope becomes visible to the bus only if the transaction
    /// commits: it is written to the store's outbox and later published by
    /// the relay.
    pub fn publish(&mut self, envelope: Envelope) {
        self.outbox.push(envelope);
    }

    pub(crate) fn into_parts(self) -> (S, Vec<ProcessedEventRecord>, Vec<Envelope>) {
        (self.state, self.marks, self.outbox)
    }
}

/// A durable store providing local ACID transactions coupled with outbound
/// message staging.
#[async_trait]
pub trait TransactionalStore<S: ServiceState>: OutboxSource {
    /// Runs `f` against a working copy of the state.
    ///
    /// On `Ok` the mutated state, staged outbox entries and idempotency marks
    /// commit atomically; on `Err` all are discarded and the error is
    /// returned unchanged.
    async fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Transaction<S>) -> Result<T> + Send + 'static;

    /// Runs a read-only closure against the committed state.
    async fn query<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> T + Send + 'static;

    /// Read-committed check whether an event id has already been marked.
    ///
    /// A fast path only: the commit-time uniqueness of the mark is the
    /// authority.
    async fn is_processed(&self, event_id: EventId) -> Result<bool>;
}
