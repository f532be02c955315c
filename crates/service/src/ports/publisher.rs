//! Event publisher port and in-memory implementation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use domain::Event;

use crate::error::{Result, ServiceError};

/// Channel receiving `Allocated` events.
pub const LINE_ALLOCATED_CHANNEL: &str = "line_allocated";

/// Channel receiving `Deallocated` events.
pub const LINE_DEALLOCATED_CHANNEL: &str = "line_deallocated";

/// Channel the broker consumer listens on for batch quantity changes.
pub const CHANGE_BATCH_QUANTITY_CHANNEL: &str = "change_batch_quantity";

/// Publishes events to an external message broker.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, channel: &str, event: &Event) -> Result<()>;
}

/// Serializes the record carried by an event, without the type envelope.
///
/// `Allocated` becomes `{"orderid": .., "sku": .., "qty": .., "batchref": ..}`.
pub fn event_payload(event: &Event) -> Result<String> {
    let payload = match event {
        Event::Allocated(data) => serde_json::to_string(data),
        Event::Deallocated(data) => serde_json::to_string(data),
        Event::OutOfStock(data) => serde_json::to_string(data),
        Event::AllocationRequested(data) => serde_json::to_string(data),
    };
    Ok(payload?)
}

/// A message recorded by [`InMemoryPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: String,
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    published: Vec<PublishedMessage>,
    failures_remaining: u32,
}

/// In-memory publisher for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<Mutex<InMemoryPublisherState>>,
}

impl InMemoryPublisher {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the publisher to fail the next `count` publishes.
    pub fn fail_next(&self, count: u32) {
        self.state().failures_remaining = count;
    }

    /// Returns every message published so far.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().published.clone()
    }

    /// Returns the payloads published on one channel.
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.state()
            .published
            .iter()
            .filter(|m| m.channel == channel)
            .map(|m| m.payload.clone())
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryPublisherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, channel: &str, event: &Event) -> Result<()> {
        let payload = event_payload(event)?;
        let mut state = self.state();

        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(ServiceError::Publish(format!(
                "Broker unavailable for channel {channel}"
            )));
        }

        tracing::debug!(channel, %payload, "publishing event");
        state.published.push(PublishedMessage {
            channel: channel.to_string(),
            payload,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{AllocatedData, BatchRef, OrderLine, Sku};

    #[test]
    fn test_allocated_payload_round_trips() {
        let line = OrderLine::new("order1", "SMALL-TABLE", 3);
        let event = Event::allocated(&line, &BatchRef::new("batch1"));

        let payload = event_payload(&event).unwrap();
        let decoded: AllocatedData = serde_json::from_str(&payload).unwrap();

        assert_eq!(Event::Allocated(decoded), event);
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "orderid": "order1",
                "sku": "SMALL-TABLE",
                "qty": 3,
                "batchref": "batch1",
            })
        );
    }

    #[tokio::test]
    async fn test_records_published_messages() {
        let publisher = InMemoryPublisher::new();
        publisher
            .publish(LINE_ALLOCATED_CHANNEL, &Event::out_of_stock(Sku::new("LAMP")))
            .await
            .unwrap();

        assert_eq!(
            publisher.published_on(LINE_ALLOCATED_CHANNEL),
            vec![r#"{"sku":"LAMP"}"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_fail_next() {
        let publisher = InMemoryPublisher::new();
        publisher.fail_next(2);
        let event = Event::out_of_stock(Sku::new("LAMP"));

        assert!(publisher.publish("c", &event).await.is_err());
        assert!(publisher.publish("c", &event).await.is_err());
        publisher.publish("c", &event).await.unwrap();
        assert_eq!(publisher.published().len(), 1);
    }
}
