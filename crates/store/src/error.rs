use common::{BatchReference, Sku, Version};
use thiserror::Error;

/// Errors that can occur when reading or writing through a unit of work.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored product moved on since this session loaded it.
    /// The commit was refused and nothing was written.
    #[error("Concurrency conflict for product {sku}: expected version {expected}")]
    ConcurrencyConflict { sku: Sku, expected: Version },

    /// The backend aborted the transaction because it could not be serialized
    /// against a concurrent one.
    #[error("Transaction could not be serialized against a concurrent writer")]
    SerializationFailure,

    /// A batch reference is already owned by a product with another SKU.
    #[error("Batch {reference} already belongs to product {owner}")]
    BatchOwnedElsewhere { reference: BatchReference, owner: Sku },

    /// The session was already committed or rolled back.
    #[error("Session already finished")]
    SessionClosed,

    /// A stored row could not be turned back into a domain value.
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true for errors caused by a concurrent writer. Resubmitting the
    /// whole command may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::SerializationFailure
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
