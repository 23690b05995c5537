//! Event bus consumer with automatic resubscription.
//!
//! [`EventConsumer`] owns the subscribe-process-resubscribe loop so that each
//! reaction to an event is just an [`EventHandler`] implementation:
//!
//! ```text
//! loop {
//!     subscribe(channels)
//!     for each message:
//!         handler.handle(payload)
//!           Ok                 -> next
//!           Err(Malformed)     -> warn, skip
//!           Err(Failed)        -> error, skip
//!     stream ended / subscribe failed -> wait retry_delay, resubscribe
//! }
//! ```
//!
//! The loop ends only when the shutdown signal fires; [`EventConsumer::run`]
//! then returns [`ConsumerError::Cancelled`] so the process supervisor sees
//! why the task stopped.
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = EventConsumer::builder()
//!     .name("draw-activation")
//!     .channels(vec!["draw_events".to_string()])
//!     .event_bus(event_bus)
//!     .handler(handler)
//!     .shutdown(lifecycle.subscribe_shutdown())
//!     .build()?;
//!
//! lifecycle.spawn("draw-activation", consumer.run());
//! ```

use async_trait::async_trait;
use futures::StreamExt;
use lottery_core::event::EventError;
use lottery_core::event_bus::{EventBus, EventStream};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Errors returned by an [`EventHandler`].
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The payload does not match the expected schema; it is skipped
    #[error("Malformed payload: {0}")]
    Malformed(#[from] EventError),

    /// Processing a well-formed event failed
    #[error("Handler failed: {0}")]
    Failed(String),
}

/// Pluggable processing logic for [`EventConsumer`].
///
/// Handlers receive the raw payload and decode it themselves, so one consumer
/// type serves every event schema.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one message payload.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the payload is malformed or processing
    /// fails. The consumer logs the error and continues with the next message.
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Errors that end a consumer loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// The shutdown signal was received
    #[error("Consumer '{0}' cancelled")]
    Cancelled(String),

    /// Builder was missing a required field
    #[error("Missing consumer field: {0}")]
    MissingField(&'static str),
}

/// Long-running event bus consumer.
pub struct EventConsumer {
    name: String,
    channels: Vec<String>,
    event_bus: Arc<dyn EventBus>,
    handler: Arc<dyn EventHandler>,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
}

impl EventConsumer {
    /// Create a builder for configuring a consumer.
    #[must_use]
    pub fn builder() -> EventConsumerBuilder {
        EventConsumerBuilder::default()
    }

    /// Consumer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run until the shutdown signal fires.
    ///
    /// # Errors
    ///
    /// Always ends with [`ConsumerError::Cancelled`]; every other failure is
    /// logged and retried.
    pub async fn run(mut self) -> Result<(), ConsumerError> {
        info!(consumer = %self.name, channels = ?self.channels, "Event consumer started");

        loop {
            let channels: Vec<&str> = self.channels.iter().map(String::as_str).collect();

            let subscription = tokio::select! {
                _ = self.shutdown.recv() => break,
                result = self.event_bus.subscribe(&channels) => result,
            };

            match subscription {
                Ok(mut stream) => {
                    info!(consumer = %self.name, "Subscribed to event bus");
                    if self.process_stream(&mut stream).await.is_break() {
                        break;
                    }
                    warn!(consumer = %self.name, "Event stream ended, resubscribing in {:?}", self.retry_delay);
                }
                Err(e) => {
                    error!(
                        consumer = %self.name,
                        error = %e,
                        "Failed to subscribe to event bus, retrying in {:?}",
                        self.retry_delay
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!(consumer = %self.name, "Event consumer stopped");
        Err(ConsumerError::Cancelled(self.name))
    }

    async fn process_stream(&mut self, stream: &mut EventStream) -> std::ops::ControlFlow<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Shutdown signal received during processing");
                    return std::ops::ControlFlow::Break(());
                }
                next = stream.next() => match next {
                    Some(Ok(message)) => self.dispatch(&message.channel, &message.payload).await,
                    Some(Err(e)) => {
                        error!(consumer = %self.name, error = %e, "Error receiving message");
                    }
                    None => return std::ops::ControlFlow::Continue(()),
                },
            }
        }
    }

    async fn dispatch(&self, channel: &str, payload: &[u8]) {
        match self.handler.handle(payload).await {
            Ok(()) => {
                debug!(consumer = %self.name, channel, "Message handled");
                metrics::counter!("lottery_events_consumed_total", "consumer" => self.name.clone(), "outcome" => "handled")
                    .increment(1);
            }
            Err(HandlerError::Malformed(e)) => {
                warn!(consumer = %self.name, channel, error = %e, "Skipping malformed message");
                metrics::counter!("lottery_events_consumed_total", "consumer" => self.name.clone(), "outcome" => "malformed")
                    .increment(1);
            }
            Err(e) => {
                error!(consumer = %self.name, channel, error = %e, "Failed to handle message");
                metrics::counter!("lottery_events_consumed_total", "consumer" => self.name.clone(), "outcome" => "failed")
                    .increment(1);
            }
        }
    }
}

/// Builder for [`EventConsumer`].
#[derive(Default)]
pub struct EventConsumerBuilder {
    name: Option<String>,
    channels: Option<Vec<String>>,
    event_bus: Option<Arc<dyn EventBus>>,
    handler: Option<Arc<dyn EventHandler>>,
    shutdown: Option<broadcast::Receiver<()>>,
    retry_delay: Option<Duration>,
}

impl EventConsumerBuilder {
    /// Set consumer name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set channels to subscribe to.
    #[must_use]
    pub fn channels(mut self, channels: Vec<String>) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Set event bus instance.
    #[must_use]
    pub fn event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Set event handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Set resubscription delay (default: 5 seconds).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Build the [`EventConsumer`].
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::MissingField`] if a required field is unset.
    pub fn build(self) -> Result<EventConsumer, ConsumerError> {
        Ok(EventConsumer {
            name: self.name.ok_or(ConsumerError::MissingField("name"))?,
            channels: self.channels.ok_or(ConsumerError::MissingField("channels"))?,
            event_bus: self.event_bus.ok_or(ConsumerError::MissingField("event_bus"))?,
            handler: self.handler.ok_or(ConsumerError::MissingField("handler"))?,
            shutdown: self.shutdown.ok_or(ConsumerError::MissingField("shutdown"))?,
            retry_delay: self.retry_delay.unwrap_or(Duration::from_secs(5)),
        })
    }
}
