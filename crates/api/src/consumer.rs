//! Broker entrypoint for batch quantity changes.
//!
//! Messages arrive on the `change_batch_quantity` channel as
//! `{"batchref": "...", "qty": N}` and are turned into
//! [`ChangeBatchQuantity`] commands.

use domain::{BatchRef, ChangeBatchQuantity};
use serde::Deserialize;
use service::ServiceError;
use store::UnitOfWorkFactory;
use thiserror::Error;

use crate::state::AppState;

/// Errors raised while consuming a broker message.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The payload is not a valid quantity change.
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The command failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Wire form of a quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeBatchQuantityMessage {
    pub batchref: BatchRef,
    pub qty: u32,
}

impl From<ChangeBatchQuantityMessage> for ChangeBatchQuantity {
    fn from(message: ChangeBatchQuantityMessage) -> Self {
        ChangeBatchQuantity::new(message.batchref, message.qty)
    }
}

/// Parses a raw payload into a command.
pub fn parse_change_batch_quantity(payload: &str) -> Result<ChangeBatchQuantity, ConsumerError> {
    let message: ChangeBatchQuantityMessage = serde_json::from_str(payload)?;
    Ok(message.into())
}

/// Parses a payload and dispatches the resulting command.
#[tracing::instrument(skip(state, payload))]
pub async fn handle_change_batch_quantity<F: UnitOfWorkFactory>(
    state: &AppState<F>,
    payload: &str,
) -> Result<(), ConsumerError> {
    let command = parse_change_batch_quantity(payload)?;
    tracing::info!(batchref = %command.reference, qty = command.qty, "changing batch quantity");
    state.dispatch(command).await?;
    Ok(())
}

/// Handles one message, logging and skipping anything that fails.
pub async fn process_message<F: UnitOfWorkFactory>(state: &AppState<F>, payload: &str) {
    let outcome = match handle_change_batch_quantity(state, payload).await {
        Ok(()) => "ok",
        Err(ConsumerError::Malformed(e)) => {
            tracing::warn!(error = %e, payload, "skipping malformed message");
            "malformed"
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to change batch quantity");
            "failed"
        }
    };
    metrics::counter!("consumer_messages_total", "outcome" => outcome).increment(1);
}
