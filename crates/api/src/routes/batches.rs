//! Batch endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::NaiveDate;
use common::BatchReference;
use domain::{ChangeBatchQuantity, CreateBatch};
use serde::{Deserialize, Serialize};
use service::{ProductSummary, views};
use store::Backend;

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateBatchRequest {
    #[serde(rename = "ref")]
    pub reference: String,
    pub sku: String,
    pub qty: u32,
    #[serde(default)]
    pub eta: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct ChangeQuantityRequest {
    pub qty: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct BatchResponse {
    #[serde(rename = "ref")]
    pub reference: String,
    pub qty: u32,
}

// -- Handlers --

/// POST /batches: register a newly purchased batch.
#[tracing::instrument(skip(state, req), fields(batch_reference = %req.reference, sku = %req.sku))]
pub async fn create<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<BatchResponse>), ApiError> {
    if req.reference.trim().is_empty() || req.sku.trim().is_empty() {
        return Err(ApiError::BadRequest("ref and sku are required".to_string()));
    }

    let command = CreateBatch::new(req.reference.as_str(), req.sku.as_str(), req.qty, req.eta);
    state.bus.handle(command).await?;

    Ok((
        StatusCode::CREATED,
        Json(BatchResponse {
            reference: req.reference,
            qty: req.qty,
        }),
    ))
}

/// POST /batches/{reference}/quantity: change a batch's purchased quantity,
/// reallocating any lines that no longer fit.
#[tracing::instrument(skip(state, req), fields(qty = req.qty))]
pub async fn change_quantity<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(reference): Path<String>,
    Json(req): Json<ChangeQuantityRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    state
        .bus
        .handle(ChangeBatchQuantity::new(reference.as_str(), req.qty))
        .await?;

    Ok(Json(BatchResponse {
        reference,
        qty: req.qty,
    }))
}

/// GET /batches/{reference}/product: the product owning a batch.
#[tracing::instrument(skip(state))]
pub async fn product<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(reference): Path<String>,
) -> Result<Json<ProductSummary>, ApiError> {
    let uow = state.bus.unit_of_work();
    views::product_for_batch(&BatchReference::new(reference.as_str()), &uow)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Batch {reference} not found")))
}
