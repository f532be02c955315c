//! Integration tests for the Product aggregate.
//!
//! These tests drive a product through the allocation lifecycle using only
//! the public API of the crate.

use chrono::{Days, NaiveDate, Utc};
use domain::{
    Aggregate, Batch, BatchRef, DomainError, Event, EventKind, HasPendingEvents, OrderLine,
    Product,
};

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn tomorrow() -> Option<NaiveDate> {
    today().checked_add_days(Days::new(1))
}

fn kinds(events: &[Event]) -> Vec<EventKind> {
    events.iter().map(Event::kind).collect()
}

mod allocation_lifecycle {
    use super::*;

    #[test]
    fn allocate_deallocate_and_reallocate() {
        let mut product = Product::new(
            "RETRO-CLOCK",
            vec![
                Batch::new("in-stock", "RETRO-CLOCK", 10, None),
                Batch::new("shipment", "RETRO-CLOCK", 100, tomorrow()),
            ],
        );

        let first = product.allocate(OrderLine::new("o1", "RETRO-CLOCK", 10));
        let second = product.allocate(OrderLine::new("o2", "RETRO-CLOCK", 10));
        assert_eq!(first, Some(BatchRef::new("in-stock")));
        assert_eq!(second, Some(BatchRef::new("shipment")));
        assert_eq!(product.version(), 2);

        let released = product
            .deallocate(&OrderLine::new("o1", "RETRO-CLOCK", 10))
            .unwrap();
        assert_eq!(released.as_str(), "in-stock");

        let third = product.allocate(OrderLine::new("o3", "RETRO-CLOCK", 5));
        assert_eq!(third, Some(BatchRef::new("in-stock")));
        assert_eq!(product.version(), 3);

        assert_eq!(
            kinds(&product.drain_events()),
            vec![
                EventKind::Allocated,
                EventKind::Allocated,
                EventKind::Deallocated,
                EventKind::Allocated,
            ]
        );
        assert!(product.pending_events().is_empty());
    }

    #[test]
    fn out_of_stock_does_not_bump_version() {
        let mut product = Product::new("SMALL-FORK", vec![Batch::new("b1", "SMALL-FORK", 10, None)]);

        assert!(product.allocate(OrderLine::new("o1", "SMALL-FORK", 10)).is_some());
        assert!(product.allocate(OrderLine::new("o2", "SMALL-FORK", 1)).is_none());

        assert_eq!(product.version(), 1);
        assert_eq!(
            product.drain_events().last(),
            Some(&Event::out_of_stock("SMALL-FORK".into()))
        );
    }
}

mod batch_quantity_changes {
    use super::*;

    #[test]
    fn shrinking_batch_requests_reallocation_of_evicted_lines() {
        let mut product = Product::new(
            "INDIFFERENT-TABLE",
            vec![
                Batch::new("batch1", "INDIFFERENT-TABLE", 50, None),
                Batch::new("batch2", "INDIFFERENT-TABLE", 50, Some(today())),
            ],
        );
        product.allocate(OrderLine::new("order1", "INDIFFERENT-TABLE", 20));
        product.allocate(OrderLine::new("order2", "INDIFFERENT-TABLE", 20));
        product.drain_events();

        product
            .change_batch_quantity(&BatchRef::new("batch1"), 25)
            .unwrap();

        let batch1 = product.batch(&BatchRef::new("batch1")).unwrap();
        assert_eq!(batch1.available_quantity(), 5);

        let events = product.drain_events();
        assert_eq!(kinds(&events), vec![EventKind::AllocationRequested]);
        let Event::AllocationRequested(data) = &events[0] else {
            panic!("expected AllocationRequested, got {:?}", events[0]);
        };

        // the evicted line finds room in the other batch
        assert_eq!(product.allocate(data.line()), Some(BatchRef::new("batch2")));
        let batch2 = product.batch(&BatchRef::new("batch2")).unwrap();
        assert_eq!(batch2.available_quantity(), 30);
    }

    #[test]
    fn unknown_batch_is_reported() {
        let mut product = Product::new("INDIFFERENT-TABLE", Vec::new());
        let err = product
            .change_batch_quantity(&BatchRef::new("nope"), 1)
            .unwrap_err();
        assert!(matches!(err, DomainError::BatchNotFound { .. }));
    }
}
