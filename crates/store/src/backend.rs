//! Storage seam: what a backend and its transactions must provide.

use async_trait::async_trait;
use common::{BatchReference, OrderId, Sku, Version};
use domain::Product;

use crate::{AllocationView, Result};

/// Where a tracked product came from, and therefore how committing it must be
/// checked against the stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Added during the session. The product must not exist yet.
    Added,
    /// Loaded from storage at this version and write revision.
    ///
    /// The revision is a backend-private counter bumped on every write. It
    /// catches concurrent writes that leave `version_number` alone, such as
    /// batch quantity changes. Backends that get this from their isolation
    /// level leave it at zero.
    Loaded { version: Version, revision: u64 },
}

/// A product read from storage, with the stamp needed to save it back.
#[derive(Debug, Clone)]
pub struct LoadedProduct {
    pub product: Product,
    pub origin: Origin,
}

/// A storage backend able to open transactions.
///
/// Implementations must be cheap to share: the unit of work holds one behind
/// an `Arc` and opens a transaction per session.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// The transaction type this backend hands out.
    type Tx: Transaction;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// One open transaction against a backend.
///
/// Writes become visible to other transactions only on `commit`. Dropping a
/// transaction without committing discards its writes.
#[async_trait]
pub trait Transaction: Send {
    /// Loads the product with this SKU.
    async fn load_product(&mut self, sku: &Sku) -> Result<Option<LoadedProduct>>;

    /// Loads the product owning the batch with this reference.
    async fn load_product_by_batch(
        &mut self,
        reference: &BatchReference,
    ) -> Result<Option<LoadedProduct>>;

    /// Loads every product.
    async fn load_products(&mut self) -> Result<Vec<LoadedProduct>>;

    /// Writes a product back.
    ///
    /// Fails with `ConcurrencyConflict` when the stored product no longer
    /// matches `origin`: it exists although it was added, or it moved on since
    /// it was loaded.
    async fn save_product(&mut self, product: &Product, origin: Origin) -> Result<()>;

    /// Adds a row to the allocations read model.
    async fn insert_allocation_view(&mut self, row: &AllocationView) -> Result<()>;

    /// Removes the read-model rows for an order's line of this SKU.
    async fn delete_allocation_view(&mut self, order_id: &OrderId, sku: &Sku) -> Result<()>;

    /// Reads the read-model rows of one order.
    async fn allocations_for_order(&mut self, order_id: &OrderId) -> Result<Vec<AllocationView>>;

    /// Makes every write of this transaction durable.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this transaction.
    async fn rollback(self) -> Result<()>;
}
