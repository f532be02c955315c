//! Product aggregate.

use common::{BatchRef, Sku};

use crate::aggregate::{Aggregate, HasPendingEvents};
use crate::error::DomainError;
use crate::messages::Event;

use super::{Batch, OrderLine, allocation};

/// Product aggregate root.
///
/// Owns every batch of one sku. All allocation changes go through the
/// product so that the version number and the raised events stay consistent.
#[derive(Debug, Clone)]
pub struct Product {
    /// The sku this product represents. Never changes.
    sku: Sku,

    /// Batches of this sku, in insertion order.
    batches: Vec<Batch>,

    /// Incremented on every successful allocation.
    version_number: i64,

    /// Events raised since the last drain.
    events: Vec<Event>,
}

impl Aggregate for Product {
    type Key = Sku;

    fn aggregate_type() -> &'static str {
        "Product"
    }

    fn key(&self) -> &Sku {
        &self.sku
    }

    fn version(&self) -> i64 {
        self.version_number
    }
}

impl HasPendingEvents for Product {
    fn pending_events(&self) -> &[Event] {
        &self.events
    }

    fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

// Query methods
impl Product {
    /// Creates a product with the given batches at version 0.
    pub fn new(sku: impl Into<Sku>, batches: Vec<Batch>) -> Self {
        Self::with_version(sku, batches, 0)
    }

    /// Rebuilds a product from persisted state.
    pub fn with_version(sku: impl Into<Sku>, batches: Vec<Batch>, version_number: i64) -> Self {
        Self {
            sku: sku.into(),
            batches,
            version_number,
            events: Vec::new(),
        }
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn version_number(&self) -> i64 {
        self.version_number
    }

    /// Returns the batches in insertion order.
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Returns the batch with the given reference.
    pub fn batch(&self, reference: &BatchRef) -> Option<&Batch> {
        self.batches.iter().find(|b| b.reference() == reference)
    }

    /// Returns the batch holding the line, if any.
    pub fn batch_containing(&self, line: &OrderLine) -> Option<&Batch> {
        self.batches.iter().find(|b| b.contains(line))
    }
}

// Command methods
impl Product {
    /// Appends a batch of this product's sku.
    pub fn add_batch(&mut self, batch: Batch) -> Result<(), DomainError> {
        if batch.sku() != &self.sku {
            return Err(DomainError::SkuMismatch {
                reference: batch.reference().clone(),
                expected: self.sku.clone(),
                actual: batch.sku().clone(),
            });
        }

        self.batches.push(batch);
        Ok(())
    }

    /// Allocates the line to the best batch of this product.
    ///
    /// On success the version number is incremented, an `Allocated` event is
    /// raised and the batch reference returned. When no batch can take the
    /// line an `OutOfStock` event is raised and `None` returned; running out
    /// of stock is an outcome, not a failure. A line that is already allocated
    /// returns its current batch without any change.
    pub fn allocate(&mut self, line: OrderLine) -> Option<BatchRef> {
        if let Some(existing) = self.batch_containing(&line) {
            return Some(existing.reference().clone());
        }

        match allocation::allocate(&line, &mut self.batches) {
            Ok(reference) => {
                self.version_number += 1;
                self.events.push(Event::allocated(&line, &reference));
                Some(reference)
            }
            Err(_) => {
                self.events.push(Event::out_of_stock(line.sku));
                None
            }
        }
    }

    /// Releases the line from whichever batch holds it.
    pub fn deallocate(&mut self, line: &OrderLine) -> Result<BatchRef, DomainError> {
        let batch = self
            .batches
            .iter_mut()
            .find(|b| b.contains(line))
            .ok_or_else(|| DomainError::OrderNotFound {
                orderid: line.orderid.clone(),
            })?;

        batch.deallocate(line)?;
        let reference = batch.reference().clone();
        self.events.push(Event::deallocated(line, &reference));
        Ok(reference)
    }

    /// Changes a batch's purchased quantity.
    ///
    /// If the batch no longer covers its allocations, lines are evicted one
    /// at a time until the available quantity is non-negative again, and an
    /// `AllocationRequested` event is raised for each evicted line.
    pub fn change_batch_quantity(
        &mut self,
        reference: &BatchRef,
        qty: u32,
    ) -> Result<(), DomainError> {
        let batch = self
            .batches
            .iter_mut()
            .find(|b| b.reference() == reference)
            .ok_or_else(|| DomainError::BatchNotFound {
                reference: reference.clone(),
            })?;

        batch.change_purchased_quantity(qty);
        while batch.available_quantity() < 0 {
            let Some(line) = batch.deallocate_one() else {
                break;
            };
            self.events.push(Event::allocation_requested(line));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{AllocatedData, EventKind};
    use chrono::{Days, NaiveDate};

    fn today() -> NaiveDate {
        chrono::Utc::now().date_naive()
    }

    fn tomorrow() -> Option<NaiveDate> {
        today().checked_add_days(Days::new(1))
    }

    #[test]
    fn test_allocate_returns_batch_ref_and_reduces_quantity() {
        let mut product = Product::new("LAMP", vec![Batch::new("b1", "LAMP", 100, None)]);

        let reference = product.allocate(OrderLine::new("o1", "LAMP", 10));

        assert_eq!(reference, Some(BatchRef::new("b1")));
        assert_eq!(product.batches()[0].available_quantity(), 90);
    }

    #[test]
    fn test_allocate_prefers_warehouse_stock() {
        let mut product = Product::new(
            "CLOCK",
            vec![
                Batch::new("shipment", "CLOCK", 100, tomorrow()),
                Batch::new("warehouse", "CLOCK", 100, None),
            ],
        );

        let reference = product.allocate(OrderLine::new("o1", "CLOCK", 10));

        assert_eq!(reference, Some(BatchRef::new("warehouse")));
        // batches keep their insertion order
        assert_eq!(product.batches()[0].reference().as_str(), "shipment");
    }

    #[test]
    fn test_allocate_increments_version_and_raises_allocated() {
        let mut product = Product::new("LAMP", vec![Batch::new("b1", "LAMP", 100, None)]);
        product.allocate(OrderLine::new("o1", "LAMP", 10));

        assert_eq!(product.version_number(), 1);
        assert_eq!(
            product.pending_events(),
            &[Event::Allocated(AllocatedData {
                orderid: "o1".into(),
                sku: "LAMP".into(),
                qty: 10,
                batchref: "b1".into(),
            })]
        );
    }

    #[test]
    fn test_out_of_stock_raises_event_and_returns_none() {
        let mut product = Product::new("LAMP", vec![Batch::new("b1", "LAMP", 10, None)]);
        product.allocate(OrderLine::new("o1", "LAMP", 10));

        let reference = product.allocate(OrderLine::new("o2", "LAMP", 1));

        assert_eq!(reference, None);
        assert_eq!(product.version_number(), 1);
        let kinds: Vec<EventKind> = product.pending_events().iter().map(Event::kind).collect();
        assert_eq!(kinds, vec![EventKind::Allocated, EventKind::OutOfStock]);
    }

    #[test]
    fn test_allocate_twice_keeps_single_allocation() {
        let mut product = Product::new("DESK", vec![Batch::new("b1", "DESK", 20, None)]);
        let line = OrderLine::new("o1", "DESK", 2);

        product.allocate(line.clone());
        let again = product.allocate(line);

        assert_eq!(again, Some(BatchRef::new("b1")));
        assert_eq!(product.batches()[0].available_quantity(), 18);
        assert_eq!(product.version_number(), 1);
    }

    #[test]
    fn test_deallocate_returns_holding_batch() {
        let mut product = Product::new(
            "PLINTH",
            vec![
                Batch::new("b1", "PLINTH", 10, None),
                Batch::new("b2", "PLINTH", 100, tomorrow()),
            ],
        );
        let line = OrderLine::new("o1", "PLINTH", 50);
        product.allocate(line.clone());

        let reference = product.deallocate(&line).unwrap();

        assert_eq!(reference.as_str(), "b2");
        assert_eq!(product.batches()[1].available_quantity(), 100);
        assert_eq!(
            product.pending_events().last().map(Event::kind),
            Some(EventKind::Deallocated)
        );
    }

    #[test]
    fn test_deallocate_unknown_line_changes_nothing() {
        let mut product = Product::new("PLINTH", vec![Batch::new("b1", "PLINTH", 10, None)]);
        product.allocate(OrderLine::new("o1", "PLINTH", 5));

        let err = product
            .deallocate(&OrderLine::new("o2", "PLINTH", 5))
            .unwrap_err();

        assert!(matches!(err, DomainError::OrderNotFound { .. }));
        assert_eq!(product.batches()[0].available_quantity(), 5);
    }

    #[test]
    fn test_add_batch_rejects_other_sku() {
        let mut product = Product::new("LAMP", Vec::new());
        let err = product
            .add_batch(Batch::new("b1", "RUG", 10, None))
            .unwrap_err();
        assert!(matches!(err, DomainError::SkuMismatch { .. }));
        assert!(product.batches().is_empty());
    }

    #[test]
    fn test_change_quantity_without_deficit_evicts_nothing() {
        let mut product = Product::new("STOOL", vec![Batch::new("b1", "STOOL", 100, None)]);
        product.allocate(OrderLine::new("o1", "STOOL", 20));
        product.drain_events();

        product
            .change_batch_quantity(&BatchRef::new("b1"), 50)
            .unwrap();

        assert_eq!(product.batches()[0].available_quantity(), 30);
        assert!(product.pending_events().is_empty());
    }

    #[test]
    fn test_change_quantity_evicts_just_enough_lines() {
        let mut product = Product::new("TABLE", vec![Batch::new("b1", "TABLE", 50, None)]);
        product.allocate(OrderLine::new("o1", "TABLE", 20));
        product.allocate(OrderLine::new("o2", "TABLE", 20));
        product.allocate(OrderLine::new("o3", "TABLE", 5));
        product.drain_events();

        product
            .change_batch_quantity(&BatchRef::new("b1"), 25)
            .unwrap();

        let batch = &product.batches()[0];
        assert!(batch.available_quantity() >= 0);
        assert_eq!(batch.available_quantity(), 0);
        let events = product.drain_events();
        assert_eq!(events.len(), 1);
        assert!(
            events
                .iter()
                .all(|e| e.kind() == EventKind::AllocationRequested)
        );
    }

    #[test]
    fn test_change_quantity_to_zero_evicts_everything() {
        let mut product = Product::new("TABLE", vec![Batch::new("b1", "TABLE", 50, None)]);
        product.allocate(OrderLine::new("o1", "TABLE", 20));
        product.allocate(OrderLine::new("o2", "TABLE", 10));
        product.drain_events();

        product.change_batch_quantity(&BatchRef::new("b1"), 0).unwrap();

        assert_eq!(product.batches()[0].allocated_quantity(), 0);
        assert_eq!(product.drain_events().len(), 2);
    }

    #[test]
    fn test_change_quantity_of_unknown_batch_fails() {
        let mut product = Product::new("TABLE", Vec::new());
        let err = product
            .change_batch_quantity(&BatchRef::new("missing"), 10)
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::BatchNotFound {
                reference: BatchRef::new("missing")
            }
        );
    }
}
