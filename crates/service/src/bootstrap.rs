//! Wires the handlers into a bus.

use std::sync::Arc;

use domain::{Allocated, OutOfStock};
use store::Backend;
use tracing::info;

use crate::bus::MessageBus;
use crate::config::BusConfig;
use crate::handlers;
use crate::registry::{Dependencies, HandlerRegistry, Needs};

/// Builds a bus over `backend` with the standard handlers registered.
pub fn bootstrap<B: Backend>(
    backend: Arc<B>,
    dependencies: Dependencies,
    config: &BusConfig,
) -> MessageBus<B> {
    let registry = default_registry(config);
    info!(
        max_attempts = config.max_attempts,
        allocated_channel = %config.allocated_channel,
        "Message bus ready"
    );
    MessageBus::new(backend, registry, dependencies, config.retry_policy())
}

/// The standard command and event handlers.
///
/// Event handlers run in the order they are listed here. Tests start from
/// this and swap out or remove individual handlers.
pub fn default_registry<B: Backend>(config: &BusConfig) -> HandlerRegistry<B> {
    let recipient = config.out_of_stock_recipient.clone();
    let channel = config.allocated_channel.clone();

    let mut registry = HandlerRegistry::new();
    registry
        .on_command("add_batch", Needs::UOW, handlers::add_batch)
        .on_command("allocate", Needs::UOW, handlers::allocate)
        .on_command(
            "change_batch_quantity",
            Needs::UOW,
            handlers::change_batch_quantity,
        )
        .on_event(
            "send_out_of_stock_notification",
            Needs::NOTIFIER,
            move |event: OutOfStock, deps| {
                let recipient = recipient.clone();
                async move { handlers::send_out_of_stock_notification(event, deps, &recipient).await }
            },
        )
        .on_event(
            "publish_allocated_event",
            Needs::PUBLISHER,
            move |event: Allocated, deps| {
                let channel = channel.clone();
                async move { handlers::publish_allocated_event(event, deps, &channel).await }
            },
        )
        .on_event(
            "add_allocation_to_read_model",
            Needs::UOW,
            handlers::add_allocation_to_read_model,
        )
        .on_event(
            "remove_allocation_from_read_model",
            Needs::UOW,
            handlers::remove_allocation_from_read_model,
        )
        .on_event("reallocate", Needs::UOW, handlers::reallocate);
    registry
}
