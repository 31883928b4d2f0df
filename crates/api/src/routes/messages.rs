//! Intake for messages published by other processes.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use store::Backend;

use super::AppState;
use crate::consumer;

#[derive(Serialize)]
pub struct MessageAccepted {
    pub handled: bool,
}

/// POST /messages: run an external message on the bus.
///
/// Always answers 202; a message that fails is logged and dropped.
pub async fn receive<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    body: String,
) -> (StatusCode, Json<MessageAccepted>) {
    let handled = consumer::handle_external_message(&state.bus, &body)
        .await
        .is_some();
    (StatusCode::ACCEPTED, Json(MessageAccepted { handled }))
}
