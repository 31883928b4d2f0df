//! In-memory storage backend.
//!
//! Committed state sits behind a tokio `RwLock`; commits validate every
//! staged product against it before anything is applied.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{BatchReference, OrderId, Sku};
use domain::Product;
use tokio::sync::RwLock;

use crate::backend::{Backend, LoadedProduct, Origin, Transaction};
use crate::{AllocationView, Result, StoreError};

#[derive(Debug, Clone)]
struct StoredProduct {
    product: Product,
    revision: u64,
}

impl StoredProduct {
    fn loaded(&self) -> LoadedProduct {
        LoadedProduct {
            product: self.product.clone(),
            origin: Origin::Loaded {
                version: self.product.version_number(),
                revision: self.revision,
            },
        }
    }
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<Sku, StoredProduct>,
    allocations_view: Vec<AllocationView>,
}

/// In-memory backend for tests and for running without a database.
///
/// Transactions read committed state and stage their writes. Commit checks
/// each staged product against what is stored and applies everything at once,
/// or nothing.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<RwLock<State>>,
    commits: Arc<AtomicUsize>,
    fail_commits: Arc<AtomicBool>,
}

impl InMemoryBackend {
    /// Creates a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions committed so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Makes every following commit fail with a serialization failure.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Returns the committed state of a product.
    pub async fn product(&self, sku: &Sku) -> Option<Product> {
        self.state
            .read()
            .await
            .products
            .get(sku)
            .map(|stored| stored.product.clone())
    }

    /// Number of committed products.
    pub async fn product_count(&self) -> usize {
        self.state.read().await.products.len()
    }

    /// Clears all products and read-model rows.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.products.clear();
        state.allocations_view.clear();
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        Ok(InMemoryTransaction {
            backend: self.clone(),
            products: Vec::new(),
            views: Vec::new(),
        })
    }
}

#[derive(Debug)]
enum ViewOp {
    Insert(AllocationView),
    Delete(OrderId, Sku),
}

impl ViewOp {
    fn apply(&self, rows: &mut Vec<AllocationView>) {
        match self {
            ViewOp::Insert(row) => rows.push(row.clone()),
            ViewOp::Delete(order_id, sku) => {
                rows.retain(|row| !(&row.order_id == order_id && &row.sku == sku));
            }
        }
    }
}

/// A transaction against [`InMemoryBackend`]. Dropping it discards the staged
/// writes.
pub struct InMemoryTransaction {
    backend: InMemoryBackend,
    products: Vec<(Product, Origin)>,
    views: Vec<ViewOp>,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn load_product(&mut self, sku: &Sku) -> Result<Option<LoadedProduct>> {
        let state = self.backend.state.read().await;
        Ok(state.products.get(sku).map(StoredProduct::loaded))
    }

    async fn load_product_by_batch(
        &mut self,
        reference: &BatchReference,
    ) -> Result<Option<LoadedProduct>> {
        let state = self.backend.state.read().await;
        Ok(state
            .products
            .values()
            .find(|stored| stored.product.batch(reference).is_some())
            .map(StoredProduct::loaded))
    }

    async fn load_products(&mut self) -> Result<Vec<LoadedProduct>> {
        let state = self.backend.state.read().await;
        let mut products: Vec<_> = state.products.values().map(StoredProduct::loaded).collect();
        products.sort_by(|a, b| a.product.sku().cmp(b.product.sku()));
        Ok(products)
    }

    async fn save_product(&mut self, product: &Product, origin: Origin) -> Result<()> {
        let mut product = product.clone();
        product.take_messages();
        self.products.retain(|(staged, _)| staged.sku() != product.sku());
        self.products.push((product, origin));
        Ok(())
    }

    async fn insert_allocation_view(&mut self, row: &AllocationView) -> Result<()> {
        self.views.push(ViewOp::Insert(row.clone()));
        Ok(())
    }

    async fn delete_allocation_view(&mut self, order_id: &OrderId, sku: &Sku) -> Result<()> {
        self.views
            .push(ViewOp::Delete(order_id.clone(), sku.clone()));
        Ok(())
    }

    async fn allocations_for_order(&mut self, order_id: &OrderId) -> Result<Vec<AllocationView>> {
        let mut rows = self.backend.state.read().await.allocations_view.clone();
        for op in &self.views {
            op.apply(&mut rows);
        }
        rows.retain(|row| &row.order_id == order_id);
        Ok(rows)
    }

    async fn commit(self) -> Result<()> {
        if self.backend.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::SerializationFailure);
        }

        let mut state = self.backend.state.write().await;

        for (product, origin) in &self.products {
            let stored = state.products.get(product.sku());
            let conflict = match (origin, stored) {
                (Origin::Added, None) => false,
                (Origin::Added, Some(_)) => true,
                (Origin::Loaded { .. }, None) => true,
                (Origin::Loaded { version, revision }, Some(stored)) => {
                    stored.product.version_number() != *version || stored.revision != *revision
                }
            };
            if conflict {
                let expected = match origin {
                    Origin::Loaded { version, .. } => *version,
                    Origin::Added => common::Version::initial(),
                };
                return Err(StoreError::ConcurrencyConflict {
                    sku: product.sku().clone(),
                    expected,
                });
            }
        }

        for (product, _) in &self.products {
            for batch in product.batches() {
                let owner = state
                    .products
                    .values()
                    .map(|stored| &stored.product)
                    .chain(self.products.iter().map(|(staged, _)| staged))
                    .find(|other| {
                        other.sku() != product.sku() && other.batch(batch.reference()).is_some()
                    });
                if let Some(owner) = owner {
                    return Err(StoreError::BatchOwnedElsewhere {
                        reference: batch.reference().clone(),
                        owner: owner.sku().clone(),
                    });
                }
            }
        }

        for (product, _) in self.products {
            let revision = state
                .products
                .get(product.sku())
                .map_or(0, |stored| stored.revision + 1);
            state
                .products
                .insert(product.sku().clone(), StoredProduct { product, revision });
        }
        for op in &self.views {
            op.apply(&mut state.allocations_view);
        }

        self.backend.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
