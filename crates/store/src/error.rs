use common::{BatchRef, Sku};
use thiserror::Error;

/// SQLSTATE raised by PostgreSQL when a repeatable-read transaction loses a race.
const SERIALIZATION_FAILURE: &str = "40001";

/// Errors that can occur when loading or committing products.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The product changed since it was loaded into this unit of work.
    #[error("Concurrency conflict for product {sku}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        sku: Sku,
        expected: i64,
        actual: i64,
    },

    /// A batch reference is already used by another product.
    #[error("Batch reference already exists: {reference}")]
    DuplicateBatch { reference: BatchRef },

    /// A product with this sku already exists.
    #[error("Product already exists: {sku}")]
    DuplicateProduct { sku: Sku },

    /// The unit of work was used outside of a scope.
    #[error("No active unit of work scope")]
    NoActiveScope,

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if retrying the whole unit of work could succeed.
    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::ConcurrencyConflict { .. } => true,
            StoreError::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some(SERIALIZATION_FAILURE)
            }
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
