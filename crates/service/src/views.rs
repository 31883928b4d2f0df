//! Read-side queries.
//!
//! Views open their own session and never commit it, so nothing they load
//! is ever written back.

use chrono::NaiveDate;
use common::{BatchReference, OrderId, Sku};
use domain::{Batch, Product};
use serde::Serialize;
use store::{AllocationView, Backend, UnitOfWork};

use crate::error::Result;

/// One batch as shown to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    #[serde(rename = "ref")]
    pub reference: BatchReference,
    pub sku: Sku,
    pub eta: Option<NaiveDate>,
    pub purchased_quantity: u32,
    pub available_quantity: i64,
}

impl From<&Batch> for BatchSummary {
    fn from(batch: &Batch) -> Self {
        Self {
            reference: batch.reference().clone(),
            sku: batch.sku().clone(),
            eta: batch.eta(),
            purchased_quantity: batch.purchased_quantity(),
            available_quantity: batch.available_quantity(),
        }
    }
}

/// One product with its batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSummary {
    pub sku: Sku,
    pub version_number: i64,
    pub batches: Vec<BatchSummary>,
}

impl From<&Product> for ProductSummary {
    fn from(product: &Product) -> Self {
        Self {
            sku: product.sku().clone(),
            version_number: product.version_number().as_i64(),
            batches: product.batches().iter().map(BatchSummary::from).collect(),
        }
    }
}

/// An allocated order line and the batch holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLineView {
    #[serde(rename = "orderid")]
    pub order_id: OrderId,
    pub sku: Sku,
    #[serde(rename = "qty")]
    pub quantity: u32,
    #[serde(rename = "batchref")]
    pub batch_reference: BatchReference,
}

/// Where each of an order's lines was allocated, from the read model.
pub async fn allocations_for_order<B: Backend>(
    order_id: &OrderId,
    uow: &UnitOfWork<B>,
) -> Result<Vec<AllocationView>> {
    let mut session = uow.begin().await?;
    Ok(session.allocations_for_order(order_id).await?)
}

/// Every product with its batches, ordered by SKU.
pub async fn products<B: Backend>(uow: &UnitOfWork<B>) -> Result<Vec<ProductSummary>> {
    let mut session = uow.begin().await?;
    let mut products = session.products()?;
    let mut summaries: Vec<ProductSummary> = products
        .list()
        .await?
        .into_iter()
        .map(ProductSummary::from)
        .collect();
    summaries.sort_by(|a, b| a.sku.cmp(&b.sku));
    Ok(summaries)
}

/// The product owning a batch, if any.
pub async fn product_for_batch<B: Backend>(
    reference: &BatchReference,
    uow: &UnitOfWork<B>,
) -> Result<Option<ProductSummary>> {
    let mut session = uow.begin().await?;
    let mut products = session.products()?;
    let product = products.get_by_batch_reference(reference).await?;
    Ok(product.map(|product| ProductSummary::from(&*product)))
}

/// Every allocated order line, read from the aggregates rather than the
/// read model. Ordered by order id, then SKU.
pub async fn order_lines<B: Backend>(uow: &UnitOfWork<B>) -> Result<Vec<OrderLineView>> {
    let mut session = uow.begin().await?;
    let mut products = session.products()?;
    let mut lines: Vec<OrderLineView> = products
        .list()
        .await?
        .into_iter()
        .flat_map(|product| product.batches())
        .flat_map(|batch| {
            batch.allocations().map(move |line| OrderLineView {
                order_id: line.order_id.clone(),
                sku: line.sku.clone(),
                quantity: line.quantity,
                batch_reference: batch.reference().clone(),
            })
        })
        .collect();
    lines.sort_by(|a, b| (&a.order_id, &a.sku).cmp(&(&b.order_id, &b.sku)));
    Ok(lines)
}
