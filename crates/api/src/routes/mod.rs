//! HTTP route handlers.

pub mod allocations;
pub mod batches;
pub mod health;
pub mod messages;
pub mod metrics;
pub mod products;

use service::MessageBus;
use store::Backend;

/// Shared application state accessible from all handlers.
pub struct AppState<B: Backend> {
    pub bus: MessageBus<B>,
}

impl<B: Backend> AppState<B> {
    pub fn new(bus: MessageBus<B>) -> Self {
        Self { bus }
    }
}
