//! Domain layer for the allocation service.
//!
//! This crate provides:
//! - `OrderLine`, `Batch` and the `Product` aggregate with the allocation rules
//! - A pure `allocate` function over a flat list of batches
//! - The `Command`/`Event` message types exchanged through the message bus
//! - The `Aggregate` and `HasPendingEvents` capabilities a unit of work depends on

pub mod aggregate;
pub mod error;
pub mod messages;
pub mod model;

pub use aggregate::{Aggregate, HasPendingEvents};
pub use error::DomainError;
pub use messages::{
    Allocate, AllocatedData, AllocationRequestedData, ChangeBatchQuantity, Command, CommandKind,
    CreateBatch, Deallocate, DeallocatedData, Event, EventKind, Message, OutOfStockData,
};
pub use model::{Batch, OrderLine, Product, allocate};

pub use common::{BatchRef, OrderId, Sku};
