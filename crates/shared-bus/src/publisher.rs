//! # Event Publisher
//!
//! Defines the publishing side of the event bus.

use crate::events::{EventQuery, NodeEvent};
use crate::subscriber::{Delivery, Subscription, SubscriptionError};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

/// Trait for publishing events to the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the bus.
    ///
    /// # Returns
    ///
    /// The number of subscriptions that received the event.
    async fn publish(&self, event: NodeEvent) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// One registered subscription, as seen from the bus.
struct Slot {
    id: Uuid,
    query: EventQuery,
    sender: mpsc::Sender<Delivery>,
    unbuffered: bool,
}

/// In-memory implementation of the event bus.
///
/// Subscriptions are grouped under a subscriber name so a service can drop
/// all of them at once with [`InMemoryEventBus::unsubscribe_all`].
///
/// Unbuffered subscriptions make `publish` wait until the subscriber has
/// taken the event, so a slow subscriber throttles the publisher instead of
/// losing events.
pub struct InMemoryEventBus {
    /// Subscriptions by subscriber name.
    subscribers: RwLock<HashMap<String, Vec<Slot>>>,

    /// Total events published.
    events_published: AtomicU64,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            events_published: AtomicU64::new(0),
        }
    }

    /// Subscribe with a buffer of `DEFAULT_CHANNEL_CAPACITY` events.
    #[must_use]
    pub fn subscribe(&self, subscriber: &str, query: EventQuery) -> Subscription {
        self.subscribe_with_capacity(subscriber, query, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Subscribe with a buffer of `capacity` events.
    ///
    /// When the buffer is full, `publish` waits for room.
    #[must_use]
    pub fn subscribe_with_capacity(
        &self,
        subscriber: &str,
        query: EventQuery,
        capacity: usize,
    ) -> Subscription {
        self.register(subscriber, query, capacity.max(1), false)
    }

    /// Subscribe without buffering: every `publish` blocks until this
    /// subscription has received the event.
    #[must_use]
    pub fn subscribe_unbuffered(&self, subscriber: &str, query: EventQuery) -> Subscription {
        self.register(subscriber, query, 1, true)
    }

    fn register(
        &self,
        subscriber: &str,
        query: EventQuery,
        capacity: usize,
        unbuffered: bool,
    ) -> Subscription {
        let (sender, receiver) = mpsc::channel(capacity);
        let id = Uuid::new_v4();

        if let Ok(mut subs) = self.subscribers.write() {
            subs.entry(subscriber.to_string()).or_default().push(Slot {
                id,
                query,
                sender,
                unbuffered,
            });
        }

        debug!(subscriber, query = ?query, unbuffered, "New subscription created");

        Subscription::new(id, subscriber.to_string(), query, receiver)
    }

    /// Remove every subscription registered under `subscriber`.
    ///
    /// Their streams end once any in-flight delivery completes.
    ///
    /// # Returns
    ///
    /// The number of subscriptions removed.
    pub fn unsubscribe_all(&self, subscriber: &str) -> Result<usize, SubscriptionError> {
        let removed = self
            .subscribers
            .write()
            .ok()
            .and_then(|mut subs| subs.remove(subscriber))
            .map(|slots| slots.len())
            .ok_or_else(|| SubscriptionError::NotSubscribed(subscriber.to_string()))?;

        debug!(subscriber, removed, "Subscriber removed from bus");
        Ok(removed)
    }

    /// Get the number of active subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .map(|subs| subs.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Check whether `subscriber` has at least one subscription.
    #[must_use]
    pub fn is_subscribed(&self, subscriber: &str) -> bool {
        self.subscribers
            .read()
            .map(|subs| subs.contains_key(subscriber))
            .unwrap_or(false)
    }

    fn targets(&self, event: &NodeEvent) -> Vec<(Uuid, mpsc::Sender<Delivery>, bool)> {
        let Ok(subs) = self.subscribers.read() else {
            return Vec::new();
        };
        subs.values()
            .flatten()
            .filter(|slot| slot.query.matches(event))
            .map(|slot| (slot.id, slot.sender.clone(), slot.unbuffered))
            .collect()
    }

    fn prune(&self, closed: &[Uuid]) {
        if closed.is_empty() {
            return;
        }
        if let Ok(mut subs) = self.subscribers.write() {
            for slots in subs.values_mut() {
                slots.retain(|slot| !closed.contains(&slot.id));
            }
            subs.retain(|_, slots| !slots.is_empty());
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: NodeEvent) -> usize {
        let query = event.query();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, sender, unbuffered) in self.targets(&event) {
            let (ack, received) = if unbuffered {
                let (tx, rx) = oneshot::channel();
                (Some(tx), Some(rx))
            } else {
                (None, None)
            };

            let delivery = Delivery {
                event: event.clone(),
                ack,
            };
            if sender.send(delivery).await.is_err() {
                closed.push(id);
                continue;
            }
            if let Some(received) = received {
                if received.await.is_err() {
                    // Receiver dropped with the event still queued.
                    closed.push(id);
                    continue;
                }
            }
            delivered += 1;
        }

        self.prune(&closed);

        if delivered == 0 {
            warn!(query = ?query, "Event dropped (no receivers)");
        } else {
            debug!(query = ?query, receivers = delivered, "Event published");
        }
        delivered
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::entities::{BlockHeader, EventDataNewBlockHeader};

    fn header() -> NodeEvent {
        NodeEvent::NewBlockHeader(EventDataNewBlockHeader {
            header: BlockHeader::new("test", 1, 0),
        })
    }

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let bus = InMemoryEventBus::new();

        let receivers = bus.publish(header()).await;
        assert_eq!(receivers, 0);
        assert_eq!(bus.events_published(), 1);
    }

    #[tokio::test]
    async fn test_publish_with_subscriber() {
        let bus = InMemoryEventBus::new();
        let _sub = bus.subscribe("a", EventQuery::All);

        let receivers = bus.publish(header()).await;

        assert_eq!(receivers, 1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_filtered_by_query() {
        let bus = InMemoryEventBus::new();

        let _sub1 = bus.subscribe("a", EventQuery::All);
        let _sub2 = bus.subscribe("b", EventQuery::NewBlockHeader);
        let _sub3 = bus.subscribe("b", EventQuery::Tx);

        let receivers = bus.publish(header()).await;

        assert_eq!(receivers, 2);
        assert_eq!(bus.subscriber_count(), 3);
    }

    #[tokio::test]
    async fn test_unsubscribe_all_removes_every_subscription_of_subscriber() {
        let bus = InMemoryEventBus::new();
        let _h = bus.subscribe_unbuffered("svc", EventQuery::NewBlockHeader);
        let _t = bus.subscribe_unbuffered("svc", EventQuery::Tx);
        let _o = bus.subscribe("other", EventQuery::All);

        assert_eq!(bus.unsubscribe_all("svc"), Ok(2));
        assert!(!bus.is_subscribed("svc"));
        assert!(bus.is_subscribed("other"));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_subscriber() {
        let bus = InMemoryEventBus::new();
        assert_eq!(
            bus.unsubscribe_all("ghost"),
            Err(SubscriptionError::NotSubscribed("ghost".to_string()))
        );
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let bus = InMemoryEventBus::new();
        {
            let _sub = bus.subscribe("gone", EventQuery::All);
        }

        let receivers = bus.publish(header()).await;
        assert_eq!(receivers, 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_default_bus() {
        let bus = InMemoryEventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.events_published(), 0);
    }
}
