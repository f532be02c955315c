//! Service layer for the allocation service.
//!
//! This crate provides:
//! - Handlers that turn commands and events into unit-of-work scoped domain operations
//! - `HandlerRegistry`, the immutable dispatch tables from message kind to handlers
//! - `MessageBus`, which drains cascades of messages with retries for event handlers
//! - The `Notifier` and `EventPublisher` ports with in-memory adapters

pub mod bus;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod registry;
pub mod retry;

pub use bus::MessageBus;
pub use error::{Result, ServiceError};
pub use handlers::{CommandHandler, CommandOutput, EventHandler};
pub use ports::{
    CHANGE_BATCH_QUANTITY_CHANNEL, EventPublisher, InMemoryNotifier, InMemoryPublisher,
    LINE_ALLOCATED_CHANNEL, LINE_DEALLOCATED_CHANNEL, LoggingNotifier, Notifier,
    PublishedMessage, SentNotification, event_payload,
};
pub use registry::{DEFAULT_OUT_OF_STOCK_DESTINATION, HandlerRegistry, HandlerRegistryBuilder};
pub use retry::RetryPolicy;
