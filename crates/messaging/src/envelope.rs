//! Message envelope carried on the bus.

use common::EventId;
use serde::{Deserialize, Serialize};

/// Mandatory headers attached to every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    /// Unique id of this message, stable across redeliveries.
    pub event_id: EventId,

    /// The wire name of the event or command (e.g. "OrderCreated").
    pub event_type: String,
}

/// A message as it travels on the bus.
///
/// The partition key of every saga-related message is the order identifier,
/// which pins all messages of one saga instance to a single partition and
/// therefore to a single observation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Destination topic.
    pub topic: String,

    /// Partition key; messages sharing a key are delivered in publish order.
    pub partition_key: String,

    /// Mandatory message headers.
    pub headers: Headers,

    /// Event- or command-specific payload fields.
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Creates an envelope with a freshly generated event id.
    pub fn new(
        topic: impl Into<String>,
        partition_key: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition_key: partition_key.into(),
            headers: Headers {
                event_id: EventId::new(),
                event_type: event_type.into(),
            },
            payload,
        }
    }

    /// Returns the message's event id.
    pub fn event_id(&self) -> EventId {
        self.headers.event_id
    }

    /// Returns the message's event type name.
    pub fn event_type(&self) -> &str {
        &self.headers.event_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_assigns_unique_event_ids() {
        let a = Envelope::new("orders-events", "k", "OrderCreated", serde_json::json!({}));
        let b = Envelope::new("orders-events", "k", "OrderCreated", serde_json::json!({}));
        assert_ne!(a.event_id(), b.event_id());
    }

    #[test]
    fn serialization_roundtrip() {
        let envelope = Envelope::new(
            "products-commands",
            "order-1",
            "ReserveProduct",
            serde_json::json!({"quantity": 2}),
        );
        let json = serde_json::to_string(&envelope).unwrap();
        let deserialized: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, deserialized);
    }
}
