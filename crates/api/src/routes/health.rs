//! Liveness and storage readiness.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use store::Backend;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: String,
}

/// GET /health: 200 while a storage session can be opened, 503 otherwise.
pub async fn check<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let uow = state.bus.unit_of_work();
    let reachable = match uow.begin().await {
        Ok(session) => session.rollback().await,
        Err(err) => Err(err),
    };

    match reachable {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                storage: "ok".to_string(),
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "storage unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    storage: err.to_string(),
                }),
            )
        }
    }
}
