//! Domain error types.

use common::BatchReference;
use thiserror::Error;

/// Errors raised by the allocation aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// No batch with this reference belongs to the product.
    #[error("Unknown batch: {0}")]
    UnknownBatch(BatchReference),

    /// A batch with nothing allocated was asked to give up a line.
    #[error("Batch {0} has no allocations to release")]
    EmptyAllocationSet(BatchReference),

    /// The product already owns a batch with this reference.
    #[error("Duplicate batch: {0}")]
    DuplicateBatch(BatchReference),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
