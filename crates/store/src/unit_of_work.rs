//! The unit of work abstraction.

use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use domain::{BatchRef, Event, Product, Sku};

use crate::Result;

/// Transactional scope over the product repository.
///
/// Products handed out by a unit of work are owned by it for the duration of
/// the scope. Changes become visible to other units of work only through
/// [`commit`](UnitOfWork::commit), which persists every product seen in the
/// scope atomically and then moves their pending events into an outbox read
/// by [`collect_new_events`](UnitOfWork::collect_new_events).
///
/// Handlers normally go through [`UnitOfWorkExt::scope`], which guarantees the
/// scope is released whatever the outcome.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Starts a new scope, forgetting anything seen in a previous one.
    async fn begin(&mut self) -> Result<()>;

    /// Loads the product for a sku into the scope.
    async fn get_product(&mut self, sku: &Sku) -> Result<Option<&mut Product>>;

    /// Loads the product owning the batch with the given reference.
    async fn get_product_by_batchref(
        &mut self,
        reference: &BatchRef,
    ) -> Result<Option<&mut Product>>;

    /// Adds a new product to the scope. It is persisted on commit.
    async fn add_product(&mut self, product: Product) -> Result<&mut Product>;

    /// Persists every product seen in the scope, then collects their events.
    async fn commit(&mut self) -> Result<()>;

    /// Discards every change made in the scope.
    async fn rollback(&mut self) -> Result<()>;

    /// Ends the scope. Uncommitted work is rolled back and the underlying
    /// resource is returned.
    fn release(&mut self);

    /// Takes the events raised by products in committed scopes.
    fn collect_new_events(&mut self) -> Vec<Event>;

    /// Returns true once the current scope has been committed.
    fn is_committed(&self) -> bool;
}

/// Extension trait providing scoped access to a unit of work.
#[async_trait]
pub trait UnitOfWorkExt: UnitOfWork + Sized {
    /// Begins a scope that is released when the returned guard is dropped.
    async fn scope(&mut self) -> Result<Scope<'_, Self>> {
        self.begin().await?;
        Ok(Scope { uow: self })
    }
}

// Blanket implementation for all UnitOfWork implementations
impl<T: UnitOfWork> UnitOfWorkExt for T {}

/// Guard over an active unit of work scope.
///
/// Dropping the guard without calling [`Scope::commit`] rolls the scope back.
pub struct Scope<'a, U: UnitOfWork> {
    uow: &'a mut U,
}

impl<U: UnitOfWork> Scope<'_, U> {
    /// Commits the scope and releases it.
    pub async fn commit(self) -> Result<()> {
        self.uow.commit().await
    }
}

impl<U: UnitOfWork> Deref for Scope<'_, U> {
    type Target = U;

    fn deref(&self) -> &U {
        self.uow
    }
}

impl<U: UnitOfWork> DerefMut for Scope<'_, U> {
    fn deref_mut(&mut self) -> &mut U {
        self.uow
    }
}

impl<U: UnitOfWork> Drop for Scope<'_, U> {
    fn drop(&mut self) {
        if !self.uow.is_committed() {
            tracing::debug!("Releasing uncommitted unit of work scope");
        }
        self.uow.release();
    }
}

/// Creates a fresh unit of work for each external request.
pub trait UnitOfWorkFactory: Send + Sync {
    type Uow: UnitOfWork + 'static;

    fn create(&self) -> Self::Uow;
}
