//! Event bus abstraction for cross-service notifications.
//!
//! Services publish JSON envelopes on named channels after their local
//! transaction commits. Delivery is fire-and-forget:
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────┐      ┌──────────────────┐
//! │ draw lifecycle   │      │   channel    │      │ ticket consumers │
//! │ 1. commit        │─────►│ draw_events  │─────►│ generate pool    │
//! │ 2. publish       │      └──────────────┘      └──────────────────┘
//! └──────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **Commit first**: state transitions are persisted before they are announced
//! - **No acknowledgment**: a successful `publish` only means the transport accepted it
//! - **No replay**: a subscriber that is not connected misses the message
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (`lottery-testing`): broadcast channels, records every publish
//! - `RedisEventBus` (`lottery-redis`): Redis pub/sub
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! event_bus.publish("draw_events", &payload).await?;
//!
//! let mut stream = event_bus.subscribe(&["draw_events"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(message) => handle(&message.payload),
//!         Err(e) => tracing::error!(error = %e, "Event stream error"),
//!     }
//! }
//! ```

use crate::event::{Event, EventError};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a channel
    #[error("Publish failed for channel '{channel}': {reason}")]
    PublishFailed {
        /// The channel that failed
        channel: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to channels
    #[error("Subscription failed for channels {channels:?}: {reason}")]
    SubscriptionFailed {
        /// The channels that failed to subscribe
        channels: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to encode an event before publishing
    #[error("Encoding failed: {0}")]
    Encoding(#[from] EventError),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// A message received from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel the message was published on
    pub channel: String,
    /// Raw payload (a JSON envelope)
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a new message.
    #[must_use]
    pub fn new(channel: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }
}

/// Stream of messages from subscriptions.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Message, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// The trait is dyn-compatible so services can hold an `Arc<dyn EventBus>` and
/// swap Redis for the in-memory bus in tests.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`: one bus is shared by every
/// scheduler and consumer task of a process.
pub trait EventBus: Send + Sync {
    /// Publish a raw payload to a channel.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the transport rejects the
    /// message or is unreachable.
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>>;

    /// Subscribe to one or more channels.
    ///
    /// Only messages published after the subscription is established are
    /// delivered.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the subscription
    /// cannot be established.
    fn subscribe<'a>(
        &'a self,
        channels: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + 'a>>;
}

/// Encode `event` and publish it on `channel`.
///
/// # Errors
///
/// Returns [`EventBusError::Encoding`] if the event cannot be serialized, or
/// the transport error from [`EventBus::publish`].
pub async fn publish_event<E: Event>(
    bus: &dyn EventBus,
    channel: &str,
    event: &E,
) -> Result<(), EventBusError> {
    let payload = event.to_json()?;
    bus.publish(channel, &payload).await
}
