//! Redis pub/sub implementation of the `EventBus` trait.
//!
//! Redis pub/sub is fire-and-forget: a message is delivered to the
//! subscribers connected at publish time and then forgotten. There are no
//! consumer groups, offsets, or replays, so a subscriber that is down misses
//! what was published meanwhile.
//!
//! - Publishing goes through a shared [`ConnectionManager`], which reconnects
//!   transparently.
//! - Each subscription opens its own dedicated pub/sub connection; when it
//!   drops, the stream ends and the consumer loop resubscribes.
//!
//! # Example
//!
//! ```no_run
//! use lottery_redis::RedisEventBus;
//! use lottery_core::event_bus::EventBus;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedisEventBus::connect("redis://127.0.0.1:6379").await?;
//! bus.publish("draw_events", br#"{"type":"draw_activated"}"#).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use futures::StreamExt;
use lottery_core::event_bus::{EventBus, EventBusError, EventStream, Message};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Event bus backed by Redis pub/sub.
#[derive(Clone)]
pub struct RedisEventBus {
    client: Client,
    publisher: ConnectionManager,
    publish_timeout: Duration,
}

impl RedisEventBus {
    /// Connect to Redis at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the URL is invalid or the
    /// server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, EventBusError> {
        let client = Client::open(url)
            .map_err(|e| EventBusError::ConnectionFailed(format!("Invalid Redis URL: {e}")))?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to connect to Redis: {e}")))?;

        tracing::info!("Connected to Redis");
        Ok(Self {
            client,
            publisher,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        })
    }

    /// Bound how long a single publish may take (default 5 seconds).
    #[must_use]
    pub const fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Check the connection with `PING`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::TransportError`] when Redis does not answer.
    pub async fn ping(&self) -> Result<(), EventBusError> {
        let mut conn = self.publisher.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| EventBusError::TransportError(e.to_string()))?;
        Ok(())
    }
}

impl EventBus for RedisEventBus {
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            let mut conn = self.publisher.clone();
            let publish = conn.publish(channel, payload);

            let receivers: i64 = match tokio::time::timeout(self.publish_timeout, publish).await {
                Ok(Ok(receivers)) => receivers,
                Ok(Err(e)) => {
                    metrics::counter!("lottery_events_published_total", "outcome" => "failed").increment(1);
                    return Err(EventBusError::PublishFailed {
                        channel: channel.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    metrics::counter!("lottery_events_published_total", "outcome" => "timeout").increment(1);
                    return Err(EventBusError::PublishFailed {
                        channel: channel.to_string(),
                        reason: format!("timed out after {:?}", self.publish_timeout),
                    });
                }
            };

            metrics::counter!("lottery_events_published_total", "outcome" => "sent").increment(1);
            tracing::debug!(channel, receivers, "Published message");
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        channels: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            let names: Vec<String> = channels.iter().map(|c| (*c).to_string()).collect();
            let failed = |reason: String| EventBusError::SubscriptionFailed {
                channels: names.clone(),
                reason,
            };

            let mut pubsub = self
                .client
                .get_async_pubsub()
                .await
                .map_err(|e| failed(e.to_string()))?;
            pubsub
                .subscribe(names.clone())
                .await
                .map_err(|e| failed(e.to_string()))?;

            tracing::debug!(channels = ?names, "Subscribed to Redis channels");

            let stream: EventStream = Box::pin(pubsub.into_on_message().map(|msg| {
                let channel = msg.get_channel_name().to_string();
                Ok(Message::new(channel, msg.get_payload_bytes().to_vec()))
            }));
            Ok(stream)
        })
    }
}
