//! Shared application state.

use domain::Message;
use service::{CommandOutput, MessageBus, ServiceError};
use store::UnitOfWorkFactory;

/// State shared by every request and consumed message.
///
/// Each dispatch gets a fresh unit of work from the factory.
pub struct AppState<F: UnitOfWorkFactory> {
    pub bus: MessageBus<F::Uow>,
    pub uow_factory: F,
}

impl<F: UnitOfWorkFactory> AppState<F> {
    pub fn new(uow_factory: F, bus: MessageBus<F::Uow>) -> Self {
        Self { bus, uow_factory }
    }

    /// Handles one inbound message on its own unit of work.
    pub async fn dispatch(
        &self,
        message: impl Into<Message> + Send,
    ) -> Result<Vec<CommandOutput>, ServiceError> {
        let mut uow = self.uow_factory.create();
        self.bus.handle(message, &mut uow).await
    }
}
