//! Persistence for the allocation service.
//!
//! This crate provides:
//! - `Backend`/`Transaction` traits that storage implementations fill in
//! - `Repository`, a tracking view of one transaction's products
//! - `UnitOfWork`/`Session`, the transactional scope handlers work in
//! - `InMemoryBackend` and `PostgresBackend`

pub mod backend;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod uow;
pub mod view;

pub use backend::{Backend, LoadedProduct, Origin, Transaction};
pub use error::{Result, StoreError};
pub use memory::{InMemoryBackend, InMemoryTransaction};
pub use postgres::{PostgresBackend, PostgresTransaction};
pub use repository::Repository;
pub use uow::{Session, UnitOfWork};
pub use view::AllocationView;
