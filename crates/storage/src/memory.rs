//! In-memory reference implementation of the transactional store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use common::EventId;

use crate::error::{Result, StoreError};
use crate::idempotency::ProcessedEventRecord;
use crate::outbox::{OutboxEntry, OutboxSource};
use crate::tx::{ServiceState, Transaction, TransactionalStore};

struct StoreInner<S> {
    state: S,
    processed: HashMap<EventId, ProcessedEventRecord>,
    outbox: Vec<OutboxEntry>,
    next_seq: i64,
    fail_next_commit: bool,
}

impl<S: Default> Default for StoreInner<S> {
    fn default() -> Self {
        Self {
            state: S::default(),
            processed: HashMap::new(),
            outbox: Vec::new(),
            next_seq: 1,
            fail_next_commit: false,
        }
    }
}

/// In-memory transactional store.
///
/// A transaction runs against a clone of the committed state under the store
/// lock; on success the clone replaces the committed state and the staged
/// outbox entries and idempotency marks are appended in the same critical
/// section — all or nothing, exactly the contract the Postgres implementation
/// provides with a real database transaction.
pub struct InMemoryStore<S> {
    inner: Arc<RwLock<StoreInner<S>>>,
}

impl<S> Clone for InMemoryStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: ServiceState> Default for InMemoryStore<S> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
        }
    }
}

impl<S: ServiceState> InMemoryStore<S> {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next transaction fail before running its closure.
    ///
    /// Simulates a store outage for tests: the inbound message's handler
    /// reports a transient failure and the bus redelivers later.
    pub fn set_fail_next_commit(&self, fail: bool) {
        self.inner.write().unwrap().fail_next_commit = fail;
    }

    /// Number of idempotency marks held.
    pub fn processed_count(&self) -> usize {
        self.inner.read().unwrap().processed.len()
    }

    /// Total number of outbox entries ever committed.
    pub fn outbox_len(&self) -> usize {
        self.inner.read().unwrap().outbox.len()
    }
}

#[async_trait]
impl<S: ServiceState> TransactionalStore<S> for InMemoryStore<S> {
    async fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Transaction<S>) -> Result<T> + Send + 'static,
    {
        let mut inner = self.inner.write().unwrap();
        if inner.fail_next_commit {
            inner.fail_next_commit = false;
            return Err(StoreError::Unavailable("simulated store outage".to_string()));
        }

        let mut tx = Transaction::new(inner.state.clone());
        let value = f(&mut tx)?;
        let (state, marks, outbox) = tx.into_parts();

        for mark in &marks {
            if inner.processed.contains_key(&mark.event_id) {
                return Err(StoreError::DuplicateEvent(mark.event_id));
            }
        }

        inner.state = state;
        for mark in marks {
            inner.processed.insert(mark.event_id, mark);
        }
        let now = Utc::now();
        for envelope in outbox {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.outbox.push(OutboxEntry {
                seq,
                envelope,
                created_at: now,
                published_at: None,
            });
        }

        Ok(value)
    }

    async fn query<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> T + Send + 'static,
    {
        let inner = self.inner.read().unwrap();
        Ok(f(&inner.state))
    }

    async fn is_processed(&self, event_id: EventId) -> Result<bool> {
        Ok(self.inner.read().unwrap().processed.contains_key(&event_id))
    }
}

#[async_trait]
impl<S: ServiceState> OutboxSource for InMemoryStore<S> {
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .outbox
            .iter()
            .filter(|e| e.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, seqs: &[i64]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let now = Utc::now();
        for entry in inner.outbox.iter_mut() {
            if seqs.contains(&entry.seq) {
                entry.published_at = Some(now);
            }
        }
        Ok(())
    }
}
