//! Allocation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::Allocate;
use serde::{Deserialize, Serialize};
use service::{OrderLineView, views};
use store::Backend;

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct AllocateRequest {
    pub orderid: String,
    pub sku: String,
    pub qty: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct AllocatedResponse {
    pub batchref: String,
}

#[derive(Serialize)]
pub struct AllocationResponse {
    pub sku: String,
    pub batchref: String,
}

// -- Handlers --

/// POST /allocate: allocate an order line to the best batch.
#[tracing::instrument(skip(state, req), fields(order_id = %req.orderid, sku = %req.sku))]
pub async fn allocate<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<AllocateRequest>,
) -> Result<(StatusCode, Json<AllocatedResponse>), ApiError> {
    if req.qty == 0 {
        return Err(ApiError::BadRequest("qty must be greater than zero".to_string()));
    }

    let results = state
        .bus
        .handle(Allocate::new(req.orderid.as_str(), req.sku.as_str(), req.qty))
        .await?;

    let batchref = results
        .first()
        .and_then(|outcome| outcome.batch_reference())
        .ok_or_else(|| ApiError::BadRequest(format!("Out of stock for sku {}", req.sku)))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AllocatedResponse {
            batchref: batchref.to_string(),
        }),
    ))
}

/// GET /allocations/{order_id}: where an order's lines were allocated.
#[tracing::instrument(skip(state))]
pub async fn for_order<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(order_id): Path<String>,
) -> Result<Json<Vec<AllocationResponse>>, ApiError> {
    let uow = state.bus.unit_of_work();
    let rows = views::allocations_for_order(&OrderId::new(order_id.as_str()), &uow).await?;
    if rows.is_empty() {
        return Err(ApiError::NotFound(format!("No allocations for order {order_id}")));
    }

    Ok(Json(
        rows.into_iter()
            .map(|row| AllocationResponse {
                sku: row.sku.to_string(),
                batchref: row.batch_reference.to_string(),
            })
            .collect(),
    ))
}

/// GET /order-lines: every allocated order line with its batch.
#[tracing::instrument(skip(state))]
pub async fn order_lines<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
) -> Result<Json<Vec<OrderLineView>>, ApiError> {
    let uow = state.bus.unit_of_work();
    Ok(Json(views::order_lines(&uow).await?))
}
