use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{BatchRef, Event, HasPendingEvents, Product, Sku};
use tokio::sync::RwLock;

use crate::{
    Result, SeenAggregates, StoreError,
    unit_of_work::{UnitOfWork, UnitOfWorkFactory},
};

/// A stored product and the number of times it has been written.
///
/// The generation changes on every write, including writes that leave
/// `version_number` alone.
#[derive(Clone)]
struct StoredProduct {
    product: Product,
    generation: i64,
}

/// In-memory product repository for testing and local runs.
///
/// Cloning shares the underlying storage, so every unit of work created from
/// a clone sees the same products.
#[derive(Clone, Default)]
pub struct InMemoryProductStore {
    products: Arc<RwLock<HashMap<Sku, StoredProduct>>>,
}

impl InMemoryProductStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a product directly, bypassing any unit of work.
    pub async fn insert(&self, product: Product) {
        let mut products = self.products.write().await;
        let generation = products.get(product.sku()).map_or(0, |s| s.generation + 1);
        products.insert(
            product.sku().clone(),
            StoredProduct {
                product,
                generation,
            },
        );
    }

    /// Returns a copy of the stored product.
    pub async fn get(&self, sku: &Sku) -> Option<Product> {
        self.products
            .read()
            .await
            .get(sku)
            .map(|s| s.product.clone())
    }

    async fn load(&self, sku: &Sku) -> Option<StoredProduct> {
        self.products.read().await.get(sku).cloned()
    }

    /// Returns the number of stored products.
    pub async fn product_count(&self) -> usize {
        self.products.read().await.len()
    }

    /// Removes every product.
    pub async fn clear(&self) {
        self.products.write().await.clear();
    }

    /// Checks that committing the seen products would keep the store consistent.
    ///
    /// A product loaded into the scope conflicts when its stored generation
    /// moved since the load.
    fn validate(
        stored: &HashMap<Sku, StoredProduct>,
        seen: &SeenAggregates<Product>,
        generations: &HashMap<Sku, i64>,
    ) -> Result<()> {
        let mut references: HashSet<&BatchRef> = HashSet::new();

        for (product, loaded_version) in seen.iter() {
            let sku = product.sku();
            let current = stored.get(sku).map(|s| s.generation);
            match (loaded_version, current) {
                (Some(_), current) => {
                    let expected = generations.get(sku).copied().unwrap_or(0);
                    if current != Some(expected) {
                        return Err(StoreError::ConcurrencyConflict {
                            sku: sku.clone(),
                            expected,
                            actual: current.unwrap_or(-1),
                        });
                    }
                }
                (None, Some(_)) => {
                    return Err(StoreError::DuplicateProduct { sku: sku.clone() });
                }
                (None, None) => {}
            }

            for batch in product.batches() {
                let reference = batch.reference();
                let taken_elsewhere = stored
                    .values()
                    .map(|other| &other.product)
                    .filter(|other| other.sku() != sku)
                    .any(|other| other.batch(reference).is_some());
                if taken_elsewhere || !references.insert(reference) {
                    return Err(StoreError::DuplicateBatch {
                        reference: reference.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl UnitOfWorkFactory for InMemoryProductStore {
    type Uow = InMemoryUnitOfWork;

    fn create(&self) -> InMemoryUnitOfWork {
        InMemoryUnitOfWork::new(self.clone())
    }
}

/// Unit of work over an [`InMemoryProductStore`].
///
/// Products are copied into the scope when loaded and written back together
/// on commit, so a rolled back scope leaves the store untouched.
pub struct InMemoryUnitOfWork {
    store: InMemoryProductStore,
    seen: SeenAggregates<Product>,
    generations: HashMap<Sku, i64>,
    outbox: Vec<Event>,
    active: bool,
    committed: bool,
}

impl InMemoryUnitOfWork {
    pub fn new(store: InMemoryProductStore) -> Self {
        Self {
            store,
            seen: SeenAggregates::new(),
            generations: HashMap::new(),
            outbox: Vec::new(),
            active: false,
            committed: false,
        }
    }

    /// Returns the store this unit of work commits to.
    pub fn store(&self) -> &InMemoryProductStore {
        &self.store
    }

    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(StoreError::NoActiveScope)
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn begin(&mut self) -> Result<()> {
        self.seen.clear();
        self.generations.clear();
        self.active = true;
        self.committed = false;
        Ok(())
    }

    async fn get_product(&mut self, sku: &Sku) -> Result<Option<&mut Product>> {
        self.ensure_active()?;

        if !self.seen.contains(sku) {
            let Some(stored) = self.store.load(sku).await else {
                return Ok(None);
            };
            self.generations.insert(sku.clone(), stored.generation);
            self.seen.insert_loaded(stored.product);
        }

        Ok(self.seen.get_mut(sku))
    }

    async fn get_product_by_batchref(
        &mut self,
        reference: &BatchRef,
    ) -> Result<Option<&mut Product>> {
        self.ensure_active()?;

        if self.seen.find_mut(|p| p.batch(reference).is_some()).is_none() {
            let sku = {
                let products = self.store.products.read().await;
                products
                    .values()
                    .find(|s| s.product.batch(reference).is_some())
                    .map(|s| s.product.sku().clone())
            };
            let Some(sku) = sku else {
                return Ok(None);
            };
            return self.get_product(&sku).await;
        }

        Ok(self.seen.find_mut(|p| p.batch(reference).is_some()))
    }

    async fn add_product(&mut self, product: Product) -> Result<&mut Product> {
        self.ensure_active()?;

        let sku = product.sku().clone();
        if self.seen.contains(&sku) || self.store.get(&sku).await.is_some() {
            return Err(StoreError::DuplicateProduct { sku });
        }

        Ok(self.seen.insert_new(product))
    }

    #[tracing::instrument(skip(self))]
    async fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;

        {
            let mut stored = self.store.products.write().await;
            if let Err(e) = InMemoryProductStore::validate(&stored, &self.seen, &self.generations)
            {
                if e.is_conflict() {
                    metrics::counter!("uow_conflicts_total").increment(1);
                }
                return Err(e);
            }

            for (product, _) in self.seen.iter() {
                let mut persisted = product.clone();
                persisted.drain_events();
                let sku = persisted.sku().clone();
                let generation = stored.get(&sku).map_or(0, |s| s.generation + 1);
                stored.insert(
                    sku.clone(),
                    StoredProduct {
                        product: persisted,
                        generation,
                    },
                );
                self.generations.insert(sku, generation);
            }
        }

        self.outbox.extend(self.seen.drain_events());
        self.seen.mark_persisted();
        self.committed = true;

        metrics::counter!("uow_commits_total").increment(1);
        tracing::debug!(products = self.seen.len(), "Unit of work committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.seen.clear();
        Ok(())
    }

    fn release(&mut self) {
        self.seen.clear();
        self.generations.clear();
        self.active = false;
    }

    fn collect_new_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    fn is_committed(&self) -> bool {
        self.committed
    }
}
