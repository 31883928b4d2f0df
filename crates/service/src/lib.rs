//! Service layer of the allocation service.
//!
//! The [`MessageBus`] takes a command, runs its handler, and then keeps
//! going through every event and follow-up command the touched products
//! recorded, until nothing is left:
//!
//! 1. `CreateBatch`, `Allocate` and `ChangeBatchQuantity` each have exactly
//!    one handler. A failing command handler fails the whole call.
//! 2. `Allocated`, `Deallocated` and `OutOfStock` have any number of
//!    handlers, each retried with back-off and skipped once it keeps failing.
//!
//! Handlers declare which collaborators they need ([`Needs`]); the bus hands
//! each call only those ([`Injected`]).

pub mod bootstrap;
pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod retry;
pub mod services;
pub mod views;

pub use bootstrap::{bootstrap, default_registry};
pub use bus::{CommandOutcome, MessageBus};
pub use codec::{decode_message, decode_value};
pub use config::BusConfig;
pub use error::{Result, ServiceError};
pub use registry::{Dependencies, HandlerRegistry, Injected, Needs};
pub use retry::RetryPolicy;
pub use services::{
    EmailNotifier, InMemoryNotifier, InMemoryPublisher, LogPublisher, Notifier, Publisher,
};
pub use views::{BatchSummary, OrderLineView, ProductSummary};
