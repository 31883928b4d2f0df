//! Outbound ports the event handlers talk to, with their adapters.

pub mod notifications;
pub mod publisher;

pub use notifications::{EmailNotifier, InMemoryNotifier, Notifier};
pub use publisher::{InMemoryPublisher, LogPublisher, Publisher};
