//! Batch entity.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use common::{BatchRef, Sku};

use crate::error::DomainError;

use super::OrderLine;

/// A batch of stock ordered by the purchasing department.
///
/// Batches are entities: two batches are the same batch when their references
/// match, whatever their quantities. Allocations have set semantics, so
/// allocating a line that is already allocated changes nothing.
#[derive(Debug, Clone)]
pub struct Batch {
    reference: BatchRef,
    sku: Sku,
    eta: Option<NaiveDate>,
    purchased_quantity: u32,
    allocations: BTreeSet<OrderLine>,
}

impl Batch {
    /// Creates a batch with no allocations.
    ///
    /// `eta` is `None` for stock already in the warehouse.
    pub fn new(
        reference: impl Into<BatchRef>,
        sku: impl Into<Sku>,
        purchased_quantity: u32,
        eta: Option<NaiveDate>,
    ) -> Self {
        Self {
            reference: reference.into(),
            sku: sku.into(),
            eta,
            purchased_quantity,
            allocations: BTreeSet::new(),
        }
    }

    /// Rebuilds a batch from persisted state.
    pub fn restore(
        reference: impl Into<BatchRef>,
        sku: impl Into<Sku>,
        purchased_quantity: u32,
        eta: Option<NaiveDate>,
        allocations: impl IntoIterator<Item = OrderLine>,
    ) -> Self {
        Self {
            allocations: allocations.into_iter().collect(),
            ..Self::new(reference, sku, purchased_quantity, eta)
        }
    }

    pub fn reference(&self) -> &BatchRef {
        &self.reference
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn eta(&self) -> Option<NaiveDate> {
        self.eta
    }

    pub fn purchased_quantity(&self) -> u32 {
        self.purchased_quantity
    }

    /// Returns the allocated lines in a stable order.
    pub fn allocations(&self) -> impl Iterator<Item = &OrderLine> {
        self.allocations.iter()
    }

    /// Returns true if the line is allocated to this batch.
    pub fn contains(&self, line: &OrderLine) -> bool {
        self.allocations.contains(line)
    }

    /// Sum of the quantities of all allocated lines.
    pub fn allocated_quantity(&self) -> i64 {
        self.allocations.iter().map(|line| i64::from(line.qty)).sum()
    }

    /// Purchased minus allocated quantity.
    ///
    /// Negative after the purchased quantity was reduced below what is
    /// already committed.
    pub fn available_quantity(&self) -> i64 {
        i64::from(self.purchased_quantity) - self.allocated_quantity()
    }

    /// True iff the skus match and enough stock is available.
    pub fn can_allocate(&self, line: &OrderLine) -> bool {
        self.sku == line.sku && self.available_quantity() >= i64::from(line.qty)
    }

    /// Allocates part of this batch to the line.
    pub fn allocate(&mut self, line: OrderLine) -> Result<(), DomainError> {
        if self.allocations.contains(&line) {
            return Ok(());
        }

        if !self.can_allocate(&line) {
            return Err(DomainError::OutOfStock { sku: line.sku });
        }

        self.allocations.insert(line);
        Ok(())
    }

    /// Releases a line previously allocated to this batch.
    pub fn deallocate(&mut self, line: &OrderLine) -> Result<(), DomainError> {
        if self.allocations.remove(line) {
            Ok(())
        } else {
            Err(DomainError::OrderNotFound {
                orderid: line.orderid.clone(),
            })
        }
    }

    /// Evicts one allocated line, largest quantity first.
    ///
    /// Lines of equal quantity are evicted in `OrderLine` order (order id,
    /// then sku). Returns `None` when nothing is allocated.
    pub fn deallocate_one(&mut self) -> Option<OrderLine> {
        let victim = self
            .allocations
            .iter()
            .max_by(|a, b| a.qty.cmp(&b.qty).then_with(|| b.cmp(a)))
            .cloned()?;
        self.allocations.remove(&victim);
        Some(victim)
    }

    /// Sets a new purchased quantity, leaving allocations untouched.
    pub fn change_purchased_quantity(&mut self, qty: u32) {
        self.purchased_quantity = qty;
    }

    /// Allocation priority: stock in the warehouse first, then earliest eta.
    pub fn allocation_order(a: &Batch, b: &Batch) -> Ordering {
        // Option orders None before Some.
        a.eta.cmp(&b.eta)
    }
}

impl PartialEq for Batch {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl Eq for Batch {}

impl Hash for Batch {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reference.hash(state);
    }
}
