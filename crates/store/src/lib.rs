//! Persistence layer for the allocation service.
//!
//! A [`UnitOfWork`] is the transactional boundary a handler works in: products
//! are loaded into it, mutated, and written back atomically on commit, after
//! which the events they raised can be collected.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod seen;
pub mod unit_of_work;

pub use error::{Result, StoreError};
pub use memory::{InMemoryProductStore, InMemoryUnitOfWork};
pub use postgres::{PostgresStore, PostgresUnitOfWork};
pub use seen::SeenAggregates;
pub use unit_of_work::{Scope, UnitOfWork, UnitOfWorkExt, UnitOfWorkFactory};
