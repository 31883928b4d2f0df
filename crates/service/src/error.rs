//! Service-layer error types.

use common::Sku;
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while handling a message.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A command named a SKU no product exists for.
    #[error("Invalid sku {0}")]
    InvalidSku(Sku),

    /// No handler is registered for this command type.
    #[error("No handler registered for command {0}")]
    UnknownCommand(String),

    /// The message is neither a known command nor a known event.
    #[error("Unroutable message: {0}")]
    UnroutableMessage(String),

    /// A handler asked for a collaborator it did not declare.
    #[error("Handler did not declare dependency: {0}")]
    MissingDependency(&'static str),

    /// Publishing an event to other processes failed.
    #[error("Publish error: {0}")]
    Publish(String),

    /// Sending a notification failed.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    /// Returns true when the failure came from a concurrent writer and the
    /// command may succeed if resubmitted.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Store(err) if err.is_conflict())
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;
