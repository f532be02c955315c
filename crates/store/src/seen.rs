//! Aggregates touched during one unit of work scope.

use domain::{Aggregate, Event, HasPendingEvents};

struct Entry<A> {
    aggregate: A,
    /// Version when loaded from the store; `None` for aggregates added in this scope.
    loaded_version: Option<i64>,
}

/// Per-scope collection of the aggregates loaded or added by a unit of work.
///
/// Owned exclusively by one unit of work and cleared whenever a scope starts
/// or ends. Iteration follows the order aggregates were first seen, so the
/// events drained at commit come out in a deterministic order.
pub struct SeenAggregates<A: Aggregate> {
    entries: Vec<Entry<A>>,
}

impl<A: Aggregate> Default for SeenAggregates<A> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<A: Aggregate> SeenAggregates<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets every aggregate, discarding any uncommitted changes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, key: &A::Key) -> bool {
        self.entries.iter().any(|e| e.aggregate.key() == key)
    }

    pub fn get_mut(&mut self, key: &A::Key) -> Option<&mut A> {
        self.find_mut(|aggregate| aggregate.key() == key)
    }

    /// Returns the first aggregate matching the predicate.
    pub fn find_mut(&mut self, mut predicate: impl FnMut(&A) -> bool) -> Option<&mut A> {
        self.entries
            .iter_mut()
            .map(|e| &mut e.aggregate)
            .find(|aggregate| predicate(aggregate))
    }

    /// Tracks an aggregate read from the store.
    pub fn insert_loaded(&mut self, aggregate: A) -> &mut A {
        let loaded_version = Some(aggregate.version());
        self.push(aggregate, loaded_version)
    }

    /// Tracks an aggregate created in this scope.
    pub fn insert_new(&mut self, aggregate: A) -> &mut A {
        self.push(aggregate, None)
    }

    fn push(&mut self, aggregate: A, loaded_version: Option<i64>) -> &mut A {
        self.entries.push(Entry {
            aggregate,
            loaded_version,
        });
        let index = self.entries.len() - 1;
        &mut self.entries[index].aggregate
    }

    /// Iterates over the aggregates with the version each one was loaded at.
    pub fn iter(&self) -> impl Iterator<Item = (&A, Option<i64>)> {
        self.entries.iter().map(|e| (&e.aggregate, e.loaded_version))
    }

    /// Records the current versions as persisted, so a later commit in the
    /// same scope checks against them.
    pub fn mark_persisted(&mut self) {
        for entry in &mut self.entries {
            entry.loaded_version = Some(entry.aggregate.version());
        }
    }
}

impl<A: Aggregate + HasPendingEvents> SeenAggregates<A> {
    /// Drains the pending events of every tracked aggregate.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.entries
            .iter_mut()
            .flat_map(|e| e.aggregate.drain_events())
            .collect()
    }
}
