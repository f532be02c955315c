//! Allocation domain events.

use common::{BatchRef, OrderId, Sku};
use serde::{Deserialize, Serialize};

use crate::model::OrderLine;

/// Facts raised by the product aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// An order line was allocated to a batch.
    Allocated(AllocatedData),

    /// An order line was released from a batch on request.
    Deallocated(DeallocatedData),

    /// No batch could satisfy an order line.
    OutOfStock(OutOfStockData),

    /// A line was evicted from a shrunk batch and needs a new home.
    AllocationRequested(AllocationRequestedData),
}

/// Dispatch key of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Allocated,
    Deallocated,
    OutOfStock,
    AllocationRequested,
}

impl EventKind {
    /// Returns the event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Allocated => "Allocated",
            EventKind::Deallocated => "Deallocated",
            EventKind::OutOfStock => "OutOfStock",
            EventKind::AllocationRequested => "AllocationRequested",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    /// Returns the dispatch key of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Allocated(_) => EventKind::Allocated,
            Event::Deallocated(_) => EventKind::Deallocated,
            Event::OutOfStock(_) => EventKind::OutOfStock,
            Event::AllocationRequested(_) => EventKind::AllocationRequested,
        }
    }

    /// Creates an Allocated event.
    pub fn allocated(line: &OrderLine, batchref: &BatchRef) -> Self {
        Event::Allocated(AllocatedData {
            orderid: line.orderid.clone(),
            sku: line.sku.clone(),
            qty: line.qty,
            batchref: batchref.clone(),
        })
    }

    /// Creates a Deallocated event.
    pub fn deallocated(line: &OrderLine, batchref: &BatchRef) -> Self {
        Event::Deallocated(DeallocatedData {
            orderid: line.orderid.clone(),
            sku: line.sku.clone(),
            qty: line.qty,
            batchref: batchref.clone(),
        })
    }

    /// Creates an OutOfStock event.
    pub fn out_of_stock(sku: Sku) -> Self {
        Event::OutOfStock(OutOfStockData { sku })
    }

    /// Creates an AllocationRequested event for an evicted line.
    pub fn allocation_requested(line: OrderLine) -> Self {
        Event::AllocationRequested(AllocationRequestedData {
            orderid: line.orderid,
            sku: line.sku,
            qty: line.qty,
        })
    }
}

/// Data for Allocated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedData {
    pub orderid: OrderId,
    pub sku: Sku,
    pub qty: u32,
    pub batchref: BatchRef,
}

/// Data for Deallocated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeallocatedData {
    pub orderid: OrderId,
    pub sku: Sku,
    pub qty: u32,
    pub batchref: BatchRef,
}

/// Data for OutOfStock event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutOfStockData {
    pub sku: Sku,
}

/// Data for AllocationRequested event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequestedData {
    pub orderid: OrderId,
    pub sku: Sku,
    pub qty: u32,
}

impl AllocationRequestedData {
    /// Returns the order line to re-allocate.
    pub fn line(&self) -> OrderLine {
        OrderLine::new(self.orderid.clone(), self.sku.clone(), self.qty)
    }
}
