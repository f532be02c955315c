//! The message bus.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use common::MessageId;
use domain::{Command, Event, Message};
use store::UnitOfWork;

use crate::error::Result;
use crate::handlers::CommandOutput;
use crate::registry::HandlerRegistry;
use crate::retry::RetryPolicy;

/// Dispatches commands and the events they cascade into.
///
/// Messages are handled one at a time from a FIFO queue seeded with the
/// top-level message. Events raised by committed units of work are appended
/// to the tail of the queue, so cascades are processed breadth-first.
///
/// A command has exactly one handler, runs once, and any error aborts the
/// dispatch. An event goes to each of its handlers in registration order;
/// every invocation is retried according to the [`RetryPolicy`] and a
/// handler that keeps failing is logged and skipped.
pub struct MessageBus<U: UnitOfWork> {
    registry: Arc<HandlerRegistry<U>>,
    retry: RetryPolicy,
}

impl<U: UnitOfWork> Clone for MessageBus<U> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            retry: self.retry,
        }
    }
}

impl<U: UnitOfWork + 'static> MessageBus<U> {
    /// Creates a new bus over the given dispatch tables.
    pub fn new(registry: HandlerRegistry<U>, retry: RetryPolicy) -> Self {
        Self {
            registry: Arc::new(registry),
            retry,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry<U> {
        &self.registry
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Handles a message and everything it cascades into.
    ///
    /// Returns the results of the commands processed, in processing order.
    #[tracing::instrument(
        skip(self, message, uow),
        fields(message_id = %MessageId::new(), root = tracing::field::Empty)
    )]
    pub async fn handle(
        &self,
        message: impl Into<Message> + Send,
        uow: &mut U,
    ) -> Result<Vec<CommandOutput>> {
        let start = Instant::now();
        let message = message.into();
        tracing::Span::current().record("root", message.name());

        let mut queue = VecDeque::from([message]);
        let mut results = Vec::new();

        while let Some(message) = queue.pop_front() {
            metrics::counter!("bus_messages_total", "message" => message.name()).increment(1);
            match message {
                Message::Command(command) => {
                    let output = self.handle_command(&command, uow).await;
                    queue.extend(uow.collect_new_events().into_iter().map(Message::Event));
                    results.push(output?);
                }
                Message::Event(event) => {
                    self.handle_event(&event, uow, &mut queue).await;
                }
            }
        }

        metrics::histogram!("bus_dispatch_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        Ok(results)
    }

    async fn handle_command(&self, command: &Command, uow: &mut U) -> Result<CommandOutput> {
        let handler = self.registry.command_handler(command.kind())?;
        tracing::debug!(command = %command.kind(), handler = handler.name(), "handling command");

        handler.handle(command, uow).await.inspect_err(|e| {
            metrics::counter!("bus_command_failures_total", "command" => command.kind().as_str())
                .increment(1);
            tracing::warn!(command = %command.kind(), error = %e, "command failed");
        })
    }

    async fn handle_event(&self, event: &Event, uow: &mut U, queue: &mut VecDeque<Message>) {
        for handler in self.registry.event_handlers(event.kind()) {
            let mut attempt = 1;
            loop {
                tracing::debug!(event = %event.kind(), handler = handler.name(), attempt, "handling event");
                let result = handler.handle(event, uow).await;
                queue.extend(uow.collect_new_events().into_iter().map(Message::Event));

                match result {
                    Ok(()) => break,
                    Err(e) if self.retry.should_retry(attempt) => {
                        let delay = self.retry.delay_for(attempt);
                        metrics::counter!("bus_event_handler_retries_total", "handler" => handler.name())
                            .increment(1);
                        tracing::warn!(
                            event = %event.kind(),
                            handler = handler.name(),
                            attempt,
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "event handler failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        metrics::counter!("bus_event_handler_failures_total", "handler" => handler.name())
                            .increment(1);
                        tracing::error!(
                            event = %event.kind(),
                            handler = handler.name(),
                            attempts = attempt,
                            error = %e,
                            "event handler failed, giving up"
                        );
                        break;
                    }
                }
            }
        }
    }
}
