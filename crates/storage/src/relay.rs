//! Outbox relay: moves committed outbox entries onto the bus.

use std::time::Duration;

use messaging::{BusError, MessageBus};
use thiserror::Error;

use crate::error::StoreError;
use crate::outbox::OutboxSource;

const DEFAULT_BATCH_SIZE: usize = 64;

/// Errors raised while relaying outbox entries.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The store could not be read or updated.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The bus refused a publish; the entry stays pending.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

/// Publishes committed outbox entries to the bus, at-least-once.
///
/// Entries are published in commit order and marked published only after the
/// bus acknowledged the send. A failure at any point leaves the remaining
/// entries pending for the next run; a crash between send and mark causes a
/// duplicate publish, which consumers discard via their idempotency store.
pub struct OutboxRelay<St, B> {
    store: St,
    bus: B,
    batch_size: usize,
}

impl<St, B> OutboxRelay<St, B>
where
    St: OutboxSource,
    B: MessageBus,
{
    /// Creates a relay over one store's outbox.
    pub fn new(store: St, bus: B) -> Self {
        Self {
            store,
            bus,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Publishes one batch of pending entries. Returns how many were
    /// published and marked.
    pub async fn run_once(&self) -> Result<usize, RelayError> {
        let pending = self.store.pending_outbox(self.batch_size).await?;
        let mut published = 0;

        for entry in pending {
            self.bus.publish(entry.envelope.clone()).await?;
            self.store.mark_published(&[entry.seq]).await?;
            published += 1;
            metrics::counter!("outbox_published_total").increment(1);
        }

        Ok(published)
    }

    /// Relay loop for the runtime: publish, sleep, repeat.
    ///
    /// Publish failures are logged and retried on the next tick.
    pub async fn run(self, poll_interval: Duration) {
        loop {
            if let Err(e) = self.run_once().await {
                tracing::warn!(error = %e, "outbox relay run failed, will retry");
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
