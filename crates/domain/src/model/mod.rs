//! Allocation aggregate: order lines, batches and the product that owns them.

mod batch;
mod order_line;
mod product;

pub use batch::Batch;
pub use order_line::OrderLine;
pub use product::Product;
