//! In-process reference implementation of the message bus.

use std::collections::{BTreeMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::bus::{MessageBus, MessageHandler};
use crate::envelope::Envelope;
use crate::error::{BusError, ConsumeError};

const DEFAULT_PARTITIONS: usize = 4;

/// A message that was classified as poison and removed from its partition.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The offending message.
    pub envelope: Envelope,
    /// Name of the consumer that rejected it.
    pub consumer: String,
    /// Why it was rejected.
    pub reason: String,
}

#[derive(Default)]
struct BusInner {
    /// Per-topic partitioned queues. A message stays queued until every
    /// subscriber has accepted it (at-least-once, ack-on-success).
    topics: BTreeMap<String, Vec<VecDeque<Envelope>>>,
    subscribers: BTreeMap<String, Vec<Arc<dyn MessageHandler>>>,
    dead_letters: Vec<DeadLetter>,
    /// Every envelope ever accepted by `publish`, in publish order.
    published_log: Vec<Envelope>,
    fail_next_publish: bool,
}

/// In-memory partitioned bus.
///
/// Messages sharing a partition key land in the same partition and are
/// delivered in publish order. Delivery happens when [`deliver_pending`] is
/// pumped (tests) or the [`run`] loop is spawned (runtime). A handler
/// returning [`ConsumeError::Transient`] leaves the message at the front of
/// its partition for a later round — including for handlers that already
/// accepted it, which is exactly the duplicate delivery consumers must
/// tolerate.
///
/// [`deliver_pending`]: InMemoryBus::deliver_pending
/// [`run`]: InMemoryBus::run
#[derive(Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<Mutex<BusInner>>,
}

impl InMemoryBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the bus to reject the next `publish` call.
    ///
    /// Used by tests to simulate broker unavailability at the worst moment
    /// (between outbox read and acknowledged send).
    pub fn set_fail_next_publish(&self, fail: bool) {
        self.inner.lock().unwrap().fail_next_publish = fail;
    }

    /// Returns every envelope ever published, in publish order.
    pub fn published(&self) -> Vec<Envelope> {
        self.inner.lock().unwrap().published_log.clone()
    }

    /// Returns every envelope ever published to one topic, in publish order.
    pub fn published_to(&self, topic: &str) -> Vec<Envelope> {
        self.inner
            .lock()
            .unwrap()
            .published_log
            .iter()
            .filter(|e| e.topic == topic)
            .cloned()
            .collect()
    }

    /// Returns the dead-letter queue.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.lock().unwrap().dead_letters.clone()
    }

    /// Number of messages still queued across all topics.
    pub fn queued_len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .topics
            .values()
            .flat_map(|partitions| partitions.iter())
            .map(|queue| queue.len())
            .sum()
    }

    fn partition_for(key: &str) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % DEFAULT_PARTITIONS
    }

    /// Delivers queued messages to subscribers until no partition makes
    /// progress. Returns the number of messages acknowledged.
    ///
    /// Partitions are drained front-first, so per-key ordering holds; a
    /// transient handler failure stops the affected partition for this round
    /// and leaves the message in place.
    pub async fn deliver_pending(&self) -> usize {
        let mut delivered = 0;
        loop {
            let mut progressed = false;
            let topic_names: Vec<String> = {
                let inner = self.inner.lock().unwrap();
                inner.topics.keys().cloned().collect()
            };

            for topic in topic_names {
                let partition_count = {
                    let inner = self.inner.lock().unwrap();
                    inner.topics.get(&topic).map(Vec::len).unwrap_or(0)
                };

                for idx in 0..partition_count {
                    loop {
                        let (envelope, handlers) = {
                            let inner = self.inner.lock().unwrap();
                            let front = inner
                                .topics
                                .get(&topic)
                                .and_then(|partitions| partitions[idx].front().cloned());
                            match front {
                                Some(envelope) => {
                                    let handlers = inner
                                        .subscribers
                                        .get(&topic)
                                        .cloned()
                                        .unwrap_or_default();
                                    (envelope, handlers)
                                }
                                None => break,
                            }
                        };

                        if handlers.is_empty() {
                            // Nobody listening yet; keep the message durable.
                            break;
                        }

                        let mut transient: Option<String> = None;
                        let mut poison: Option<(String, String)> = None;
                        for handler in &handlers {
                            match handler.handle(&envelope).await {
                                Ok(()) => {}
                                Err(ConsumeError::Transient(reason)) => {
                                    transient = Some(reason);
                                    break;
                                }
                                Err(ConsumeError::Poison(reason)) => {
                                    poison = Some((handler.name().to_string(), reason));
                                }
                            }
                        }

                        let mut inner = self.inner.lock().unwrap();
                        if let Some(reason) = transient {
                            tracing::warn!(
                                topic = %topic,
                                event_id = %envelope.event_id(),
                                %reason,
                                "delivery failed, message left for redelivery"
                            );
                            break;
                        }

                        if let Some(partitions) = inner.topics.get_mut(&topic) {
                            partitions[idx].pop_front();
                        }
                        progressed = true;

                        if let Some((consumer, reason)) = poison {
                            tracing::error!(
                                topic = %topic,
                                event_id = %envelope.event_id(),
                                %consumer,
                                %reason,
                                "message routed to dead-letter queue"
                            );
                            metrics::counter!("bus_messages_dead_lettered_total").increment(1);
                            inner.dead_letters.push(DeadLetter {
                                envelope,
                                consumer,
                                reason,
                            });
                        } else {
                            delivered += 1;
                        }
                    }
                }
            }

            if !progressed {
                break;
            }
        }
        delivered
    }

    /// Delivery loop for the runtime: pump, sleep, repeat.
    pub async fn run(self, poll_interval: Duration) {
        loop {
            self.deliver_pending().await;
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, envelope: Envelope) -> Result<(), BusError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_next_publish {
            inner.fail_next_publish = false;
            return Err(BusError::Unavailable("publish rejected".to_string()));
        }

        let partition = Self::partition_for(&envelope.partition_key);
        let partitions = inner
            .topics
            .entry(envelope.topic.clone())
            .or_insert_with(|| vec![VecDeque::new(); DEFAULT_PARTITIONS]);
        partitions[partition].push_back(envelope.clone());
        inner.published_log.push(envelope);
        metrics::counter!("bus_messages_published_total").increment(1);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BusError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![VecDeque::new(); DEFAULT_PARTITIONS]);
        inner
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }
}
