//! Message bus abstraction for the order saga system.
//!
//! The bus is partitioned, durable and at-least-once: it may redeliver any
//! message, it never drops an unacknowledged one, and it preserves the
//! relative order of messages sharing a partition key. Consumers must
//! therefore be idempotent; the idempotency machinery lives in the `storage`
//! crate.
//!
//! [`InMemoryBus`] is the in-process reference implementation used by the
//! default topology and the test suites.

pub mod bus;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod topics;

pub use bus::{MessageBus, MessageHandler};
pub use envelope::{Envelope, Headers};
pub use error::{BusError, ConsumeError};
pub use memory::{DeadLetter, InMemoryBus};
