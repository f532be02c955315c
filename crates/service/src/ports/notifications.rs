//! Notification port and in-memory implementation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{Result, ServiceError};

/// Sends a message to a human, e.g. by email.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, message: &str) -> Result<()>;
}

/// A notification recorded by [`InMemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub destination: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<SentNotification>,
    failures_remaining: u32,
}

/// In-memory notifier for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail the next `count` sends.
    pub fn fail_next(&self, count: u32) {
        self.state().failures_remaining = count;
    }

    /// Returns every notification sent so far.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.state().sent.clone()
    }

    /// Returns the messages sent to one destination.
    pub fn sent_to(&self, destination: &str) -> Vec<String> {
        self.state()
            .sent
            .iter()
            .filter(|n| n.destination == destination)
            .map(|n| n.message.clone())
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryNotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        let mut state = self.state();

        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(ServiceError::Notification(format!(
                "Could not reach {destination}"
            )));
        }

        state.sent.push(SentNotification {
            destination: destination.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

/// Notifier that writes each notification to the log.
///
/// Used by the binaries in place of a mail relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        tracing::info!(destination, message, "notification sent");
        Ok(())
    }
}
