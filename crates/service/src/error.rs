//! Service layer error types.

use domain::{DomainError, Sku};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while handling commands and events.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The command referenced a sku with no known product.
    #[error("Invalid sku {sku}")]
    InvalidSku { sku: Sku },

    /// Domain error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No handler is registered for a command.
    #[error("No handler registered for command {kind}")]
    MissingHandler { kind: String },

    /// More than one handler is registered for a command.
    #[error("Command {kind} has {count} handlers registered, expected exactly one")]
    AmbiguousHandler { kind: String, count: usize },

    /// A handler received a message it was not registered for.
    #[error("Handler '{handler}' cannot handle {message}")]
    UnexpectedMessage {
        handler: &'static str,
        message: &'static str,
    },

    /// Notification service error.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Event publisher error.
    #[error("Publish error: {0}")]
    Publish(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::OrderId;

    #[test]
    fn test_invalid_sku_message() {
        let err = ServiceError::InvalidSku {
            sku: Sku::new("NONEXISTENTSKU"),
        };
        assert_eq!(err.to_string(), "Invalid sku NONEXISTENTSKU");
    }

    #[test]
    fn test_domain_errors_keep_their_message() {
        let err: ServiceError = DomainError::OrderNotFound {
            orderid: OrderId::new("o1"),
        }
        .into();
        assert_eq!(err.to_string(), "Could not find an allocation for line o1");
    }
}
