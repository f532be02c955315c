//! Dispatch tables mapping message kinds to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use domain::{CommandKind, EventKind};
use store::UnitOfWork;

use crate::error::{Result, ServiceError};
use crate::handlers::{
    AddBatchHandler, AllocateHandler, ChangeBatchQuantityHandler, CommandHandler,
    DeallocateHandler, EventHandler, OutOfStockNotificationHandler, PublishAllocatedHandler,
    PublishDeallocatedHandler, ReallocateHandler,
};
use crate::ports::{EventPublisher, Notifier};

/// Default destination for out-of-stock notifications.
pub const DEFAULT_OUT_OF_STOCK_DESTINATION: &str = "stock@made.com";

/// Immutable command and event dispatch tables.
///
/// Built once at startup and shared read-only by every bus.
pub struct HandlerRegistry<U: UnitOfWork> {
    commands: HashMap<CommandKind, Vec<Arc<dyn CommandHandler<U>>>>,
    events: HashMap<EventKind, Vec<Arc<dyn EventHandler<U>>>>,
}

impl<U: UnitOfWork + 'static> HandlerRegistry<U> {
    /// Starts an empty registry.
    pub fn builder() -> HandlerRegistryBuilder<U> {
        HandlerRegistryBuilder::default()
    }

    /// Wires the production handlers.
    ///
    /// | message               | handlers                                  |
    /// |-----------------------|-------------------------------------------|
    /// | `CreateBatch`         | `add_batch`                               |
    /// | `Allocate`            | `allocate`                                |
    /// | `Deallocate`          | `deallocate`                              |
    /// | `ChangeBatchQuantity` | `change_batch_quantity`                   |
    /// | `Allocated`           | `publish_allocated_event`                 |
    /// | `Deallocated`         | `publish_deallocated_event`               |
    /// | `OutOfStock`          | `send_out_of_stock_notification`          |
    /// | `AllocationRequested` | `reallocate`                              |
    pub fn standard(
        notifier: Arc<dyn Notifier>,
        publisher: Arc<dyn EventPublisher>,
        out_of_stock_destination: impl Into<String>,
    ) -> Self {
        Self::builder()
            .command(CommandKind::CreateBatch, AddBatchHandler)
            .command(CommandKind::Allocate, AllocateHandler)
            .command(CommandKind::Deallocate, DeallocateHandler)
            .command(CommandKind::ChangeBatchQuantity, ChangeBatchQuantityHandler)
            .event(
                EventKind::Allocated,
                PublishAllocatedHandler::new(publisher.clone()),
            )
            .event(
                EventKind::Deallocated,
                PublishDeallocatedHandler::new(publisher),
            )
            .event(
                EventKind::OutOfStock,
                OutOfStockNotificationHandler::new(notifier, out_of_stock_destination),
            )
            .event(EventKind::AllocationRequested, ReallocateHandler)
            .build()
    }
}

impl<U: UnitOfWork> HandlerRegistry<U> {
    /// Returns the single handler for a command kind.
    pub fn command_handler(&self, kind: CommandKind) -> Result<&Arc<dyn CommandHandler<U>>> {
        match self.commands.get(&kind).map(Vec::as_slice) {
            Some([handler]) => Ok(handler),
            None | Some([]) => Err(ServiceError::MissingHandler {
                kind: kind.to_string(),
            }),
            Some(handlers) => Err(ServiceError::AmbiguousHandler {
                kind: kind.to_string(),
                count: handlers.len(),
            }),
        }
    }

    /// Returns the handlers for an event kind in registration order.
    pub fn event_handlers(&self, kind: EventKind) -> &[Arc<dyn EventHandler<U>>] {
        self.events.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Builder for [`HandlerRegistry`].
pub struct HandlerRegistryBuilder<U: UnitOfWork> {
    commands: HashMap<CommandKind, Vec<Arc<dyn CommandHandler<U>>>>,
    events: HashMap<EventKind, Vec<Arc<dyn EventHandler<U>>>>,
}

impl<U: UnitOfWork> Default for HandlerRegistryBuilder<U> {
    fn default() -> Self {
        Self {
            commands: HashMap::new(),
            events: HashMap::new(),
        }
    }
}

impl<U: UnitOfWork + 'static> HandlerRegistryBuilder<U> {
    /// Registers a command handler.
    pub fn command(mut self, kind: CommandKind, handler: impl CommandHandler<U> + 'static) -> Self {
        self.commands
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
        self
    }

    /// Registers an event handler. Handlers run in registration order.
    pub fn event(mut self, kind: EventKind, handler: impl EventHandler<U> + 'static) -> Self {
        self.events.entry(kind).or_default().push(Arc::new(handler));
        self
    }

    pub fn build(self) -> HandlerRegistry<U> {
        HandlerRegistry {
            commands: self.commands,
            events: self.events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{InMemoryNotifier, InMemoryPublisher};
    use store::InMemoryUnitOfWork;

    fn standard() -> HandlerRegistry<InMemoryUnitOfWork> {
        HandlerRegistry::standard(
            Arc::new(InMemoryNotifier::new()),
            Arc::new(InMemoryPublisher::new()),
            DEFAULT_OUT_OF_STOCK_DESTINATION,
        )
    }

    #[test]
    fn test_standard_registry_has_one_handler_per_command() {
        let registry = standard();
        for kind in [
            CommandKind::CreateBatch,
            CommandKind::Allocate,
            CommandKind::Deallocate,
            CommandKind::ChangeBatchQuantity,
        ] {
            assert!(registry.command_handler(kind).is_ok(), "{kind}");
        }
        assert_eq!(
            registry
                .command_handler(CommandKind::Allocate)
                .unwrap()
                .name(),
            "allocate"
        );
    }

    #[test]
    fn test_standard_registry_event_handlers() {
        let registry = standard();
        let names: Vec<&str> = registry
            .event_handlers(EventKind::OutOfStock)
            .iter()
            .map(|h| h.name())
            .collect();
        assert_eq!(names, vec!["send_out_of_stock_notification"]);
        assert_eq!(registry.event_handlers(EventKind::AllocationRequested).len(), 1);
    }

    #[test]
    fn test_missing_command_handler() {
        let registry = HandlerRegistry::<InMemoryUnitOfWork>::builder().build();
        let err = registry
            .command_handler(CommandKind::Allocate)
            .err()
            .unwrap();
        assert!(matches!(err, ServiceError::MissingHandler { .. }));
        assert!(registry.event_handlers(EventKind::Allocated).is_empty());
    }

    #[test]
    fn test_ambiguous_command_handler() {
        let registry = HandlerRegistry::<InMemoryUnitOfWork>::builder()
            .command(CommandKind::Allocate, AllocateHandler)
            .command(CommandKind::Allocate, AllocateHandler)
            .build();
        let err = registry
            .command_handler(CommandKind::Allocate)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ServiceError::AmbiguousHandler { count: 2, .. }
        ));
    }
}
