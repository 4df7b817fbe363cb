//! Transactional storage for the order saga system.
//!
//! The central contract is [`TransactionalStore::with_transaction`]: a closure
//! mutates a working copy of the service's durable state and stages outbound
//! envelopes and idempotency marks; on success everything commits together,
//! on failure nothing does. This is what rules out the split-brain where a
//! downstream consumer observes an event describing a state change that never
//! durably happened (or vice versa).
//!
//! Outbound envelopes are committed into a per-store outbox; an
//! [`OutboxRelay`] publishes them to the bus at-least-once. Duplicate
//! suppression on the consuming side is provided by [`process_once`] backed
//! by the processed-events table.

pub mod error;
pub mod history;
pub mod idempotency;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod relay;
pub mod tx;

pub use error::{Result, StoreError};
pub use history::{HistoryEntry, HistoryLog};
pub use idempotency::{Applied, ProcessedEventRecord, process_once};
pub use memory::InMemoryStore;
pub use outbox::{OutboxEntry, OutboxSource};
pub use postgres::PostgresStore;
pub use relay::{OutboxRelay, RelayError};
pub use tx::{ServiceState, Transaction, TransactionalStore};
