//! HTTP transport for the allocation service.
//!
//! Provides REST endpoints that turn requests into bus commands, read-side
//! queries over the views, an intake for messages from other processes,
//! and the usual observability endpoints.

pub mod config;
pub mod consumer;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use service::{Dependencies, EmailNotifier, LogPublisher, MessageBus};
use store::Backend;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<B: Backend>(bus: MessageBus<B>, metrics_handle: PrometheusHandle) -> Router {
    let state = Arc::new(AppState::new(bus));

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<B>))
        .route("/batches", post(routes::batches::create::<B>))
        .route(
            "/batches/{reference}/quantity",
            post(routes::batches::change_quantity::<B>),
        )
        .route(
            "/batches/{reference}/product",
            get(routes::batches::product::<B>),
        )
        .route("/allocate", post(routes::allocations::allocate::<B>))
        .route(
            "/allocations/{order_id}",
            get(routes::allocations::for_order::<B>),
        )
        .route("/order-lines", get(routes::allocations::order_lines::<B>))
        .route("/products", get(routes::products::list::<B>))
        .route("/messages", post(routes::messages::receive::<B>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The production notifier and publisher.
pub fn default_dependencies() -> Dependencies {
    Dependencies::new(Arc::new(EmailNotifier::new()), Arc::new(LogPublisher))
}
