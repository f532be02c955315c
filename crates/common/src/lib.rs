//! Shared identifier types for the allocation service.

pub mod types;

pub use types::{BatchRef, MessageId, OrderId, Sku};
