use common::{OrderId, Sku};
use serde::{Deserialize, Serialize};

/// A single line of a customer order: some quantity of one product.
///
/// Order lines are values. Two lines with the same order, product and
/// quantity are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: OrderId,
    pub sku: Sku,
    pub quantity: u32,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(order_id: impl Into<OrderId>, sku: impl Into<Sku>, quantity: u32) -> Self {
        Self {
            order_id: order_id.into(),
            sku: sku.into(),
            quantity,
        }
    }
}
