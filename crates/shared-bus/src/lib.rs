//! # Shared Bus - Node Event Bus
//!
//! In-process publish/subscribe bus carrying block and transaction lifecycle
//! notifications from consensus to the services attached to the node.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────────┐
//! │  Consensus   │                    │ Attached service │
//! │              │    publish()       │                  │
//! │              │ ──────┐            │                  │
//! └──────────────┘       │            └──────────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe_unbuffered()
//! ```
//!
//! ## Delivery Modes
//!
//! - **Unbuffered:** `publish` waits until the subscriber has received the
//!   event. A slow subscriber back-pressures the publisher.
//! - **Buffered:** events queue up to the subscription's capacity.
//!
//! Subscriptions are owned by a subscriber name; `unsubscribe_all` removes
//! all of them and ends their streams.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{EventQuery, NodeEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{Subscription, SubscriptionError};

/// Buffer size for buffered subscriptions.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
