//! In-memory event bus.
//!
//! Messages fan out through a tokio broadcast channel to every live
//! subscription whose channel list matches. Like Redis pub/sub, a message
//! published while nobody listens is dropped, but the bus keeps its own log so
//! tests can assert on what was published.

use async_stream::stream;
use lottery_core::event_bus::{EventBus, EventBusError, EventStream, Message};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

/// In-memory [`EventBus`] with a publish log and failure injection.
///
/// Clones share the same bus.
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

struct Inner {
    sender: broadcast::Sender<Message>,
    published: Mutex<Vec<Message>>,
    failures_pending: AtomicUsize,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                sender,
                published: Mutex::new(Vec::new()),
                failures_pending: AtomicUsize::new(0),
            }),
        }
    }

    /// Make the next `count` publish calls fail. Failed publishes are not logged.
    pub fn fail_next_publishes(&self, count: usize) {
        self.inner.failures_pending.fetch_add(count, Ordering::SeqCst);
    }

    /// Every successfully published message, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<Message> {
        self.inner
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Published payloads on `channel`, decoded as JSON.
    ///
    /// Payloads that are not valid JSON are skipped.
    #[must_use]
    pub fn published_json(&self, channel: &str) -> Vec<serde_json::Value> {
        self.published()
            .into_iter()
            .filter(|m| m.channel == channel)
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    fn take_failure(&self) -> bool {
        self.inner
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            if self.take_failure() {
                return Err(EventBusError::PublishFailed {
                    channel: channel.to_string(),
                    reason: "injected failure".to_string(),
                });
            }

            let message = Message::new(channel, payload.to_vec());
            self.inner
                .published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message.clone());
            // Nobody listening is not an error for pub/sub.
            let _ = self.inner.sender.send(message);
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        channels: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            let mut receiver = self.inner.sender.subscribe();
            let channels: Vec<String> = channels.iter().map(|c| (*c).to_string()).collect();

            let stream: EventStream = Box::pin(stream! {
                loop {
                    match receiver.recv().await {
                        Ok(message) => {
                            if channels.contains(&message.channel) {
                                yield Ok(message);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            yield Err(EventBusError::TransportError(format!("subscriber lagged by {missed} messages")));
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            Ok(stream)
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn subscribers_only_see_their_channels() {
        let bus = InMemoryEventBus::new();
        let mut draws = bus.subscribe(&["draws"]).await.unwrap();

        bus.publish("invoices", b"{}").await.unwrap();
        bus.publish("draws", b"{\"n\":1}").await.unwrap();

        let message = draws.next().await.unwrap().unwrap();
        assert_eq!(message.channel, "draws");
        assert_eq!(message.payload, b"{\"n\":1}");
        assert_eq!(bus.published().len(), 2);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let bus = InMemoryEventBus::new();
        bus.fail_next_publishes(1);

        assert!(bus.publish("draws", b"1").await.is_err());
        assert!(bus.publish("draws", b"2").await.is_ok());
        assert_eq!(bus.published().len(), 1);
    }
}
