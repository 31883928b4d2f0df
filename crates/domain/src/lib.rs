//! Domain layer for the allocation service.
//!
//! This crate provides:
//! - Message types (`Command`, `Event`, `Message`) in a leaf module
//! - The `Product` aggregate with its `Batch` entities and `OrderLine` values
//! - `DomainError` for rule violations inside the aggregate
//!
//! Nothing here performs I/O. Aggregates record what happened as pending
//! messages; persisting them and routing the messages is the job of the
//! `store` and `service` crates.

pub mod error;
pub mod messages;
pub mod model;

pub use error::{DomainError, Result};
pub use messages::{
    Allocate, Allocated, ChangeBatchQuantity, Command, CommandKind, CommandType, CreateBatch,
    Deallocated, Event, EventKind, EventType, Message, OutOfStock,
};
pub use model::{Batch, OrderLine, Product};
