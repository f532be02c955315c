//! Outbound ports called by event handlers.

pub mod notifications;
pub mod publisher;

pub use notifications::{InMemoryNotifier, LoggingNotifier, Notifier, SentNotification};
pub use publisher::{
    CHANGE_BATCH_QUANTITY_CHANNEL, EventPublisher, InMemoryPublisher, LINE_ALLOCATED_CHANNEL,
    LINE_DEALLOCATED_CHANNEL, PublishedMessage, event_payload,
};
