//! Product listing.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use service::{ProductSummary, views};
use store::Backend;

use super::AppState;
use crate::error::ApiError;

/// GET /products: every product with its batches.
#[tracing::instrument(skip(state))]
pub async fn list<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
) -> Result<Json<Vec<ProductSummary>>, ApiError> {
    let uow = state.bus.unit_of_work();
    Ok(Json(views::products(&uow).await?))
}
