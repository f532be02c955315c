use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use domain::{Batch, BatchRef, Event, OrderLine, Product, Sku};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions};

use crate::{
    Result, SeenAggregates, StoreError,
    unit_of_work::{UnitOfWork, UnitOfWorkFactory},
};

/// PostgreSQL-backed product repository.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

impl UnitOfWorkFactory for PostgresStore {
    type Uow = PostgresUnitOfWork;

    fn create(&self) -> PostgresUnitOfWork {
        PostgresUnitOfWork::new(self.pool.clone())
    }
}

/// Unit of work backed by a repeatable-read PostgreSQL transaction.
pub struct PostgresUnitOfWork {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    seen: SeenAggregates<Product>,
    outbox: Vec<Event>,
    committed: bool,
}

impl PostgresUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: None,
            seen: SeenAggregates::new(),
            outbox: Vec::new(),
            committed: false,
        }
    }

    fn connection(&mut self) -> Result<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(StoreError::NoActiveScope)
    }

    async fn load_product(conn: &mut PgConnection, sku: &Sku) -> Result<Option<Product>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version_number FROM products WHERE sku = $1")
                .bind(sku.as_str())
                .fetch_optional(&mut *conn)
                .await?;
        let Some(version) = version else {
            return Ok(None);
        };

        let allocation_rows = sqlx::query(
            r#"
            SELECT a.batch_reference, a.orderid, a.sku, a.qty
            FROM allocations a
            JOIN batches b ON b.reference = a.batch_reference
            WHERE b.sku = $1
            "#,
        )
        .bind(sku.as_str())
        .fetch_all(&mut *conn)
        .await?;

        let mut allocations: HashMap<String, Vec<OrderLine>> = HashMap::new();
        for row in allocation_rows {
            let line = OrderLine::new(
                row.try_get::<String, _>("orderid")?,
                row.try_get::<String, _>("sku")?,
                to_quantity(row.try_get("qty")?)?,
            );
            allocations
                .entry(row.try_get("batch_reference")?)
                .or_default()
                .push(line);
        }

        let batch_rows = sqlx::query(
            r#"
            SELECT reference, sku, purchased_quantity, eta
            FROM batches
            WHERE sku = $1
            ORDER BY id ASC
            "#,
        )
        .bind(sku.as_str())
        .fetch_all(&mut *conn)
        .await?;

        let mut batches = Vec::with_capacity(batch_rows.len());
        for row in batch_rows {
            let reference: String = row.try_get("reference")?;
            let lines = allocations.remove(&reference).unwrap_or_default();
            batches.push(Batch::restore(
                reference,
                row.try_get::<String, _>("sku")?,
                to_quantity(row.try_get("purchased_quantity")?)?,
                row.try_get::<Option<NaiveDate>, _>("eta")?,
                lines,
            ));
        }

        Ok(Some(Product::with_version(sku.clone(), batches, version)))
    }

    async fn save_product(
        conn: &mut PgConnection,
        product: &Product,
        loaded_version: Option<i64>,
    ) -> Result<()> {
        let sku = product.sku();

        match loaded_version {
            Some(expected) => {
                let result = sqlx::query(
                    "UPDATE products SET version_number = $1 WHERE sku = $2 AND version_number = $3",
                )
                .bind(product.version_number())
                .bind(sku.as_str())
                .bind(expected)
                .execute(&mut *conn)
                .await?;

                if result.rows_affected() == 0 {
                    let actual: Option<i64> =
                        sqlx::query_scalar("SELECT version_number FROM products WHERE sku = $1")
                            .bind(sku.as_str())
                            .fetch_optional(&mut *conn)
                            .await?;
                    return Err(StoreError::ConcurrencyConflict {
                        sku: sku.clone(),
                        expected,
                        actual: actual.unwrap_or(0),
                    });
                }
            }
            None => {
                sqlx::query("INSERT INTO products (sku, version_number) VALUES ($1, $2)")
                    .bind(sku.as_str())
                    .bind(product.version_number())
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        if let sqlx::Error::Database(ref db_err) = e
                            && db_err.is_unique_violation()
                        {
                            return StoreError::DuplicateProduct { sku: sku.clone() };
                        }
                        StoreError::Database(e)
                    })?;
            }
        }

        for batch in product.batches() {
            // A reference owned by another sku leaves the row untouched.
            let result = sqlx::query(
                r#"
                INSERT INTO batches (reference, sku, purchased_quantity, eta)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (reference) DO UPDATE
                SET purchased_quantity = EXCLUDED.purchased_quantity, eta = EXCLUDED.eta
                WHERE batches.sku = EXCLUDED.sku
                "#,
            )
            .bind(batch.reference().as_str())
            .bind(sku.as_str())
            .bind(i64::from(batch.purchased_quantity()))
            .bind(batch.eta())
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::DuplicateBatch {
                    reference: batch.reference().clone(),
                });
            }
        }

        sqlx::query(
            r#"
            DELETE FROM allocations
            WHERE batch_reference IN (SELECT reference FROM batches WHERE sku = $1)
            "#,
        )
        .bind(sku.as_str())
        .execute(&mut *conn)
        .await?;

        for batch in product.batches() {
            for line in batch.allocations() {
                sqlx::query(
                    r#"
                    INSERT INTO allocations (batch_reference, orderid, sku, qty)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(batch.reference().as_str())
                .bind(line.orderid.as_str())
                .bind(line.sku.as_str())
                .bind(i64::from(line.qty))
                .execute(&mut *conn)
                .await?;
            }
        }

        Ok(())
    }
}

fn to_quantity(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn begin(&mut self) -> Result<()> {
        self.seen.clear();
        self.committed = false;

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        self.tx = Some(tx);
        Ok(())
    }

    async fn get_product(&mut self, sku: &Sku) -> Result<Option<&mut Product>> {
        if !self.seen.contains(sku) {
            let conn = self.connection()?;
            let Some(product) = Self::load_product(conn, sku).await? else {
                return Ok(None);
            };
            self.seen.insert_loaded(product);
        }

        Ok(self.seen.get_mut(sku))
    }

    async fn get_product_by_batchref(
        &mut self,
        reference: &BatchRef,
    ) -> Result<Option<&mut Product>> {
        if self.seen.find_mut(|p| p.batch(reference).is_some()).is_some() {
            return Ok(self.seen.find_mut(|p| p.batch(reference).is_some()));
        }

        let conn = self.connection()?;
        let sku: Option<String> =
            sqlx::query_scalar("SELECT sku FROM batches WHERE reference = $1")
                .bind(reference.as_str())
                .fetch_optional(&mut *conn)
                .await?;

        match sku {
            Some(sku) => self.get_product(&Sku::new(sku)).await,
            None => Ok(None),
        }
    }

    async fn add_product(&mut self, product: Product) -> Result<&mut Product> {
        let sku = product.sku().clone();
        let conn = self.connection()?;
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT version_number FROM products WHERE sku = $1")
                .bind(sku.as_str())
                .fetch_optional(&mut *conn)
                .await?;

        if exists.is_some() || self.seen.contains(&sku) {
            return Err(StoreError::DuplicateProduct { sku });
        }

        Ok(self.seen.insert_new(product))
    }

    #[tracing::instrument(skip(self))]
    async fn commit(&mut self) -> Result<()> {
        let mut tx = self.tx.take().ok_or(StoreError::NoActiveScope)?;

        for (product, loaded_version) in self.seen.iter() {
            if let Err(e) = Self::save_product(&mut tx, product, loaded_version).await {
                if e.is_conflict() {
                    metrics::counter!("uow_conflicts_total").increment(1);
                }
                return Err(e);
            }
        }

        tx.commit().await?;

        self.outbox.extend(self.seen.drain_events());
        self.seen.mark_persisted();
        self.committed = true;

        metrics::counter!("uow_commits_total").increment(1);
        tracing::debug!(products = self.seen.len(), "Unit of work committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.seen.clear();
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    fn release(&mut self) {
        // Dropping an open transaction rolls it back.
        self.tx = None;
        self.seen.clear();
    }

    fn collect_new_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    fn is_committed(&self) -> bool {
        self.committed
    }
}
