//! Tracking repository for the `Product` aggregate.

use common::{BatchReference, Sku};
use domain::Product;
use tracing::debug;

use crate::backend::{LoadedProduct, Origin, Transaction};
use crate::Result;

/// A product the session handed out, with the stamp it must be saved under.
#[derive(Debug)]
pub(crate) struct Tracked {
    pub(crate) product: Product,
    pub(crate) origin: Origin,
}

/// Repository over one open transaction.
///
/// Every product it returns or is given is recorded in the session's seen
/// list, and the same SKU always resolves to the same in-memory product for
/// the rest of the session. That list is how committed changes are saved and
/// how the bus finds the messages products recorded.
pub struct Repository<'s, T: Transaction> {
    tx: &'s mut T,
    seen: &'s mut Vec<Tracked>,
}

impl<'s, T: Transaction> Repository<'s, T> {
    pub(crate) fn new(tx: &'s mut T, seen: &'s mut Vec<Tracked>) -> Self {
        Self { tx, seen }
    }

    /// Starts tracking a new product.
    pub fn add(&mut self, product: Product) -> &mut Product {
        debug!(sku = %product.sku(), "Tracking new product");
        self.track(LoadedProduct {
            product,
            origin: Origin::Added,
        })
    }

    /// Returns the product with this SKU, if it exists.
    pub async fn get(&mut self, sku: &Sku) -> Result<Option<&mut Product>> {
        if let Some(index) = self.position(|p| p.sku() == sku) {
            return Ok(Some(&mut self.seen[index].product));
        }
        match self.tx.load_product(sku).await? {
            Some(loaded) => Ok(Some(self.track(loaded))),
            None => Ok(None),
        }
    }

    /// Returns the product owning the batch with this reference, if any.
    pub async fn get_by_batch_reference(
        &mut self,
        reference: &BatchReference,
    ) -> Result<Option<&mut Product>> {
        if let Some(index) = self.position(|p| p.batch(reference).is_some()) {
            return Ok(Some(&mut self.seen[index].product));
        }
        let Some(loaded) = self.tx.load_product_by_batch(reference).await? else {
            return Ok(None);
        };
        // The batch may have been added to an already tracked product by
        // another writer; the tracked copy wins.
        if let Some(index) = self.position(|p| p.sku() == loaded.product.sku()) {
            return Ok(Some(&mut self.seen[index].product));
        }
        Ok(Some(self.track(loaded)))
    }

    /// Returns every stored product, plus any added during this session.
    pub async fn list(&mut self) -> Result<Vec<&Product>> {
        for loaded in self.tx.load_products().await? {
            if self.position(|p| p.sku() == loaded.product.sku()).is_none() {
                self.track(loaded);
            }
        }
        Ok(self.seen.iter().map(|t| &t.product).collect())
    }

    fn position(&self, pred: impl Fn(&Product) -> bool) -> Option<usize> {
        self.seen.iter().position(|t| pred(&t.product))
    }

    fn track(&mut self, loaded: LoadedProduct) -> &mut Product {
        self.seen.push(Tracked {
            product: loaded.product,
            origin: loaded.origin,
        });
        let last = self.seen.len() - 1;
        &mut self.seen[last].product
    }
}
