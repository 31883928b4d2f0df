//! Identifier types shared by every layer of the allocation service.

pub mod types;

pub use types::{BatchReference, OrderId, Sku, Version};
