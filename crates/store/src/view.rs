//! Read-model rows.

use common::{BatchReference, OrderId, Sku};
use serde::{Deserialize, Serialize};

/// One row of the denormalized allocations table: which batch an order's
/// line for a given SKU ended up in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationView {
    #[serde(rename = "orderid")]
    pub order_id: OrderId,

    pub sku: Sku,

    #[serde(rename = "batchref")]
    pub batch_reference: BatchReference,
}

impl AllocationView {
    pub fn new(
        order_id: impl Into<OrderId>,
        sku: impl Into<Sku>,
        batch_reference: impl Into<BatchReference>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            sku: sku.into(),
            batch_reference: batch_reference.into(),
        }
    }
}
