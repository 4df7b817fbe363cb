//! Append-only history log.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

/// A single status snapshot in an order's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry<S> {
    /// Monotonically increasing entry id, unique within the log.
    pub entry_id: u64,
    /// The order this entry belongs to.
    pub order_id: OrderId,
    /// The status snapshot at the time of the transition.
    pub status: S,
    /// When the entry was written.
    pub recorded_at: DateTime<Utc>,
}

/// Durable, append-only sequence of status snapshots per order.
///
/// One entry is appended per saga transition, in the same transaction as the
/// order mutation it narrates, so the log can never diverge from the
/// authoritative status. Entries are never updated or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryLog<S> {
    entries: Vec<HistoryEntry<S>>,
    next_entry_id: u64,
}

impl<S> Default for HistoryLog<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_entry_id: 1,
        }
    }
}

impl<S: Clone> HistoryLog<S> {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a status snapshot for an order. Returns the entry id.
    pub fn append(&mut self, order_id: OrderId, status: S) -> u64 {
        let entry_id = self.next_entry_id;
        self.next_entry_id += 1;
        self.entries.push(HistoryEntry {
            entry_id,
            order_id,
            status,
            recorded_at: Utc::now(),
        });
        entry_id
    }

    /// Returns the entries for one order, in write order.
    pub fn list_by_order(&self, order_id: OrderId) -> Vec<HistoryEntry<S>> {
        self.entries
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Total number of entries across all orders.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the log has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_increasing_entry_ids() {
        let mut log: HistoryLog<&'static str> = HistoryLog::new();
        let order_id = OrderId::new();

        let first = log.append(order_id, "CREATED");
        let second = log.append(order_id, "APPROVED");

        assert!(first < second);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn list_by_order_preserves_write_order() {
        let mut log: HistoryLog<&'static str> = HistoryLog::new();
        let order_a = OrderId::new();
        let order_b = OrderId::new();

        log.append(order_a, "CREATED");
        log.append(order_b, "CREATED");
        log.append(order_a, "REJECTED");

        let entries = log.list_by_order(order_a);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, "CREATED");
        assert_eq!(entries[1].status, "REJECTED");
        assert!(entries[0].entry_id < entries[1].entry_id);
    }

    #[test]
    fn unknown_order_has_empty_history() {
        let log: HistoryLog<&'static str> = HistoryLog::new();
        assert!(log.list_by_order(OrderId::new()).is_empty());
        assert!(log.is_empty());
    }
}
