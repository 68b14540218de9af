//! # Event Subscriber
//!
//! Defines the subscription side of the event bus.

use crate::events::{EventQuery, NodeEvent};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The subscription was removed from the bus.
    #[error("Subscription closed")]
    Closed,

    /// `unsubscribe_all` was called for a subscriber with no subscriptions.
    #[error("Subscriber {0} has no subscriptions")]
    NotSubscribed(String),
}

/// A single event handed to one subscription.
///
/// Unbuffered subscriptions carry an acknowledgement that the receiving side
/// fires once the event has been taken off the channel.
#[derive(Debug)]
pub(crate) struct Delivery {
    pub(crate) event: NodeEvent,
    pub(crate) ack: Option<oneshot::Sender<()>>,
}

/// A subscription handle for receiving events.
///
/// The stream ends once the bus drops every sender for it, which happens on
/// `unsubscribe_all` for the owning subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    subscriber: String,
    query: EventQuery,
    receiver: mpsc::Receiver<Delivery>,
}

impl Subscription {
    pub(crate) fn new(
        id: Uuid,
        subscriber: String,
        query: EventQuery,
        receiver: mpsc::Receiver<Delivery>,
    ) -> Self {
        Self {
            id,
            subscriber,
            query,
            receiver,
        }
    }

    /// Receive the next event.
    ///
    /// # Returns
    ///
    /// - `Some(event)` - The next matching event
    /// - `None` - The subscription was removed from the bus
    pub async fn recv(&mut self) -> Option<NodeEvent> {
        let delivery = self.receiver.recv().await?;
        Some(Self::accept(delivery))
    }

    /// Try to receive the next event without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))` - An event was available
    /// - `Ok(None)` - No event available (would block)
    /// - `Err(SubscriptionError::Closed)` - The subscription was removed
    pub fn try_recv(&mut self) -> Result<Option<NodeEvent>, SubscriptionError> {
        match self.receiver.try_recv() {
            Ok(delivery) => Ok(Some(Self::accept(delivery))),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(SubscriptionError::Closed),
        }
    }

    fn accept(delivery: Delivery) -> NodeEvent {
        if let Some(ack) = delivery.ack {
            // Publisher may have given up waiting; nothing to do then.
            let _ = ack.send(());
        }
        delivery.event
    }

    /// Unique id of this subscription.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the subscriber that owns this subscription.
    #[must_use]
    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }

    /// Get the query for this subscription.
    #[must_use]
    pub fn query(&self) -> EventQuery {
        self.query
    }
}
