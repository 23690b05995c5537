//! Event consumer loop against the in-memory bus.
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use lottery_core::event::EventError;
use lottery_core::event_bus::EventBus;
use lottery_runtime::{ConsumerError, EventConsumer, EventHandler, HandlerError};
use lottery_testing::InMemoryEventBus;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| HandlerError::Malformed(EventError::DeserializationError(e.to_string())))?;
        if text == "explode" {
            return Err(HandlerError::Failed("handler exploded".into()));
        }
        self.seen.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

async fn wait_for_subscriber(bus: &InMemoryEventBus) {
    while bus.subscriber_count() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn wait_for_seen(handler: &RecordingHandler, count: usize) {
    for _ in 0..200 {
        if handler.seen.lock().unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn bad_messages_are_skipped_and_shutdown_cancels() {
    let bus = InMemoryEventBus::new();
    let handler = Arc::new(RecordingHandler::default());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let consumer = EventConsumer::builder()
        .name("recorder")
        .channels(vec!["events".to_string()])
        .event_bus(Arc::new(bus.clone()))
        .handler(Arc::clone(&handler) as Arc<dyn EventHandler>)
        .shutdown(shutdown_rx)
        .retry_delay(Duration::from_millis(10))
        .build()
        .unwrap();
    let task = tokio::spawn(consumer.run());
    wait_for_subscriber(&bus).await;

    bus.publish("events", b"one").await.unwrap();
    bus.publish("events", &[0xff, 0xfe]).await.unwrap();
    bus.publish("events", b"explode").await.unwrap();
    bus.publish("other", b"ignored").await.unwrap();
    bus.publish("events", b"two").await.unwrap();
    wait_for_seen(&handler, 2).await;

    shutdown_tx.send(()).unwrap();
    let result = task.await.unwrap();

    assert_eq!(result, Err(ConsumerError::Cancelled("recorder".into())));
    assert_eq!(*handler.seen.lock().unwrap(), vec!["one".to_string(), "two".to_string()]);
}

#[test]
fn builder_reports_missing_fields() {
    let result = EventConsumer::builder().name("incomplete").build();
    assert!(matches!(result, Err(ConsumerError::MissingField("channels"))));
}
