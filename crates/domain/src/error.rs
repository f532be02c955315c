//! Domain error types.

use common::{BatchRef, OrderId, Sku};
use thiserror::Error;

/// Errors raised by the allocation model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// No batch can satisfy the order line.
    #[error("Out of stock for sku {sku}")]
    OutOfStock { sku: Sku },

    /// The order line was never allocated.
    #[error("Could not find an allocation for line {orderid}")]
    OrderNotFound { orderid: OrderId },

    /// No batch with this reference belongs to the product.
    #[error("Batch not found: {reference}")]
    BatchNotFound { reference: BatchRef },

    /// A batch was added to a product with a different sku.
    #[error("Batch {reference} has sku {actual}, expected {expected}")]
    SkuMismatch {
        reference: BatchRef,
        expected: Sku,
        actual: Sku,
    },
}
