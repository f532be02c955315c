//! Allocation over a flat list of batches.

use common::BatchRef;

use crate::error::DomainError;

use super::{Batch, OrderLine};

/// Allocates the line to the highest-priority batch that can take it.
///
/// Batches are tried in stock-first, earliest-eta order; the list itself is
/// not reordered. Fails with [`DomainError::OutOfStock`] when no batch
/// qualifies.
pub fn allocate(line: &OrderLine, batches: &mut [Batch]) -> Result<BatchRef, DomainError> {
    let mut candidates: Vec<&mut Batch> = batches.iter_mut().collect();
    candidates.sort_by(|a, b| Batch::allocation_order(a, b));

    let batch = candidates
        .into_iter()
        .find(|batch| batch.can_allocate(line))
        .ok_or_else(|| DomainError::OutOfStock {
            sku: line.sku.clone(),
        })?;

    batch.allocate(line.clone())?;
    Ok(batch.reference().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};

    fn today() -> NaiveDate {
        chrono::Utc::now().date_naive()
    }

    fn tomorrow() -> Option<NaiveDate> {
        today().checked_add_days(Days::new(1))
    }

    fn next_week() -> Option<NaiveDate> {
        today().checked_add_days(Days::new(7))
    }

    #[test]
    fn test_prefers_current_stock_batches_to_shipments() {
        let mut batches = vec![
            Batch::new("shipment-batch", "LAVA-LAMP", 100, tomorrow()),
            Batch::new("in-stock-batch", "LAVA-LAMP", 100, None),
        ];
        let line = OrderLine::new("oref", "LAVA-LAMP", 10);

        allocate(&line, &mut batches).unwrap();

        assert_eq!(batches[0].available_quantity(), 100);
        assert_eq!(batches[1].available_quantity(), 90);
    }

    #[test]
    fn test_prefers_earlier_batches() {
        let mut batches = vec![
            Batch::new("normal-batch", "SILVER-SPOON", 100, tomorrow()),
            Batch::new("speedy-batch", "SILVER-SPOON", 100, Some(today())),
            Batch::new("slow-batch", "SILVER-SPOON", 100, next_week()),
        ];
        let line = OrderLine::new("order1", "SILVER-SPOON", 10);

        let reference = allocate(&line, &mut batches).unwrap();

        assert_eq!(reference.as_str(), "speedy-batch");
        assert_eq!(batches[0].available_quantity(), 100);
        assert_eq!(batches[1].available_quantity(), 90);
        assert_eq!(batches[2].available_quantity(), 100);
    }

    #[test]
    fn test_picks_in_stock_then_earliest_eta() {
        let mut batches = vec![
            Batch::new("tomorrow", "CLOCK", 10, tomorrow()),
            Batch::new("in-stock", "CLOCK", 10, None),
            Batch::new("next-week", "CLOCK", 10, next_week()),
        ];

        let first = allocate(&OrderLine::new("o1", "CLOCK", 10), &mut batches).unwrap();
        let second = allocate(&OrderLine::new("o2", "CLOCK", 10), &mut batches).unwrap();
        let third = allocate(&OrderLine::new("o3", "CLOCK", 10), &mut batches).unwrap();

        assert_eq!(first.as_str(), "in-stock");
        assert_eq!(second.as_str(), "tomorrow");
        assert_eq!(third.as_str(), "next-week");
    }

    #[test]
    fn test_returns_allocated_batch_ref() {
        let mut batches = vec![
            Batch::new("in-stock-batch-ref", "FANCY-CHAIR", 100, None),
            Batch::new("shipment-batch-ref", "FANCY-CHAIR", 100, tomorrow()),
        ];
        let reference =
            allocate(&OrderLine::new("oref", "FANCY-CHAIR", 10), &mut batches).unwrap();
        assert_eq!(reference, BatchRef::new("in-stock-batch-ref"));
    }

    #[test]
    fn test_skips_batches_of_other_skus() {
        let mut batches = vec![
            Batch::new("other", "TOASTER", 100, None),
            Batch::new("mine", "KETTLE", 100, tomorrow()),
        ];
        let reference = allocate(&OrderLine::new("o1", "KETTLE", 10), &mut batches).unwrap();
        assert_eq!(reference.as_str(), "mine");
        assert_eq!(batches[0].available_quantity(), 100);
    }

    #[test]
    fn test_raises_out_of_stock_if_cannot_allocate() {
        let mut batches = vec![Batch::new("batch1", "WOOD-CABINET", 10, Some(today()))];
        allocate(&OrderLine::new("order1", "WOOD-CABINET", 10), &mut batches).unwrap();

        let err = allocate(&OrderLine::new("order2", "WOOD-CABINET", 1), &mut batches).unwrap_err();

        assert!(err.to_string().contains("WOOD-CABINET"));
        assert_eq!(batches[0].available_quantity(), 0);
    }

    #[test]
    fn test_out_of_stock_with_no_batches() {
        let err = allocate(&OrderLine::new("o1", "NOTHING", 1), &mut []).unwrap_err();
        assert!(matches!(err, DomainError::OutOfStock { .. }));
    }
}
