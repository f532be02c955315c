//! Core aggregate capabilities.

use std::fmt::Debug;
use std::hash::Hash;

use crate::messages::Event;

/// Trait for aggregate roots loaded and saved through a unit of work.
///
/// An aggregate is a cluster of domain objects that can be treated as a single unit.
/// The aggregate root ensures consistency of changes being made within the aggregate.
pub trait Aggregate: Clone + Send + Sync {
    /// Identity of the aggregate within its repository.
    type Key: Clone + Eq + Hash + Debug + Send + Sync;

    /// Returns the aggregate type name.
    ///
    /// Used in logs and storage errors.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identity.
    fn key(&self) -> &Self::Key;

    /// Returns the optimistic-concurrency version of the aggregate.
    fn version(&self) -> i64;
}

/// Capability of an aggregate that records domain events while it is mutated.
///
/// Events accumulate during a single operation and are drained by the unit of work
/// once the changes that produced them are committed.
pub trait HasPendingEvents {
    /// Returns the events raised since the last drain.
    fn pending_events(&self) -> &[Event];

    /// Removes and returns the pending events in the order they were raised.
    fn drain_events(&mut self) -> Vec<Event>;
}
