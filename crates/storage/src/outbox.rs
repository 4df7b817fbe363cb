//! Outbox entries and the relay-facing store surface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use messaging::Envelope;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A committed outbound message awaiting (or after) publication.
///
/// Written in the same local transaction as the business mutation that caused
/// it, then published by the relay and marked. The mark happens after the
/// acknowledged send, so a crash in between produces a duplicate publish —
/// never a lost message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Commit-ordered sequence number.
    pub seq: i64,
    /// The message to publish.
    pub envelope: Envelope,
    /// When the entry was committed.
    pub created_at: DateTime<Utc>,
    /// When the entry was published, if it has been.
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Returns true if the entry has not been published yet.
    pub fn is_pending(&self) -> bool {
        self.published_at.is_none()
    }
}

/// The outbox surface a store exposes to its relay.
#[async_trait]
pub trait OutboxSource: Send + Sync {
    /// Returns up to `limit` unpublished entries in commit order.
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// Marks entries as published after an acknowledged send.
    async fn mark_published(&self, seqs: &[i64]) -> Result<()>;
}
