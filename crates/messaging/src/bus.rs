//! Bus and handler traits.

use async_trait::async_trait;
use std::sync::Arc;

use crate::envelope::Envelope;
use crate::error::{BusError, ConsumeError};

/// A partitioned, durable, at-least-once publish/subscribe bus.
///
/// Guarantees:
/// - an acknowledged `publish` is never silently dropped;
/// - messages sharing a partition key are delivered in publish order;
/// - any message may be delivered more than once.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes an envelope to its topic.
    async fn publish(&self, envelope: Envelope) -> Result<(), BusError>;

    /// Registers a handler for a topic.
    ///
    /// Every message on the topic is delivered to every registered handler.
    /// A message is acknowledged only once all handlers have accepted it.
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>)
    -> Result<(), BusError>;
}

/// A message consumer.
///
/// Handlers must be safe to invoke multiple times with the same envelope;
/// duplicate suppression is the consumer's job, not the bus's.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Name used in logs and dead-letter records.
    fn name(&self) -> &'static str;

    /// Applies the message's effect.
    ///
    /// Returning `Ok` acknowledges the message (a discarded duplicate is
    /// `Ok`). `ConsumeError::Transient` leaves it queued for redelivery;
    /// `ConsumeError::Poison` routes it to the dead-letter queue.
    async fn handle(&self, envelope: &Envelope) -> Result<(), ConsumeError>;
}
