//! Unit of work: transactional scopes that remember what they touched.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::{OrderId, Sku};
use domain::{Message, Product};
use tracing::{debug, warn};

use crate::backend::{Backend, Transaction};
use crate::repository::{Repository, Tracked};
use crate::{AllocationView, Result, StoreError};

/// Opens transactional sessions against one backend and keeps every product
/// those sessions touched, so the messages they recorded can be collected
/// once the session is over.
///
/// A unit of work belongs to a single `handle()` run of the message bus. It
/// is not meant to be shared between concurrent runs.
pub struct UnitOfWork<B: Backend> {
    backend: Arc<B>,
    seen: Mutex<Vec<Product>>,
}

impl<B: Backend> UnitOfWork<B> {
    /// Creates a unit of work over the given backend.
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Returns the backend this unit of work opens transactions on.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Opens a session.
    ///
    /// The session rolls back when dropped unless `Session::commit` was
    /// called. Either way the products it touched are handed back to this
    /// unit of work when it ends.
    pub async fn begin(&self) -> Result<Session<'_, B>> {
        let tx = self.backend.begin().await?;
        metrics::counter!("uow_sessions_total").increment(1);
        Ok(Session {
            uow: self,
            tx: Some(tx),
            seen: Vec::new(),
            committed: false,
        })
    }

    /// Drains the messages recorded by every product seen so far.
    ///
    /// Messages of one product come out in the order they were recorded.
    /// Products are visited in the order sessions first touched them. A second
    /// call with no change in between returns nothing.
    pub fn collect_new_events(&self) -> Vec<Message> {
        let mut seen = self.lock_seen();
        let mut messages = Vec::new();
        for product in seen.iter_mut() {
            while let Some(message) = product.pop_message() {
                messages.push(message);
            }
        }
        messages
    }

    /// Number of products handed back by finished sessions.
    pub fn seen_count(&self) -> usize {
        self.lock_seen().len()
    }

    fn lock_seen(&self) -> MutexGuard<'_, Vec<Product>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One open transaction plus the products it handed out.
pub struct Session<'u, B: Backend> {
    uow: &'u UnitOfWork<B>,
    tx: Option<B::Tx>,
    seen: Vec<Tracked>,
    committed: bool,
}

impl<B: Backend> Session<'_, B> {
    /// Repository over this session's transaction.
    pub fn products(&mut self) -> Result<Repository<'_, B::Tx>> {
        let tx = self.tx.as_mut().ok_or(StoreError::SessionClosed)?;
        Ok(Repository::new(tx, &mut self.seen))
    }

    /// Records that an order line landed in a batch.
    pub async fn insert_allocation_view(&mut self, row: &AllocationView) -> Result<()> {
        self.tx()?.insert_allocation_view(row).await
    }

    /// Forgets where an order's line for this SKU landed.
    pub async fn delete_allocation_view(&mut self, order_id: &OrderId, sku: &Sku) -> Result<()> {
        self.tx()?.delete_allocation_view(order_id, sku).await
    }

    /// Reads where each of an order's lines landed.
    pub async fn allocations_for_order(&mut self, order_id: &OrderId) -> Result<Vec<AllocationView>> {
        self.tx()?.allocations_for_order(order_id).await
    }

    /// Saves every tracked product and commits the transaction.
    ///
    /// Products stay tracked after the commit, so the messages they recorded
    /// are still collected. A failed commit leaves nothing behind in storage.
    pub async fn commit(mut self) -> Result<()> {
        let mut tx = self.tx.take().ok_or(StoreError::SessionClosed)?;
        for tracked in &self.seen {
            if let Err(err) = tx.save_product(&tracked.product, tracked.origin).await {
                if err.is_conflict() {
                    metrics::counter!("uow_conflicts_total").increment(1);
                }
                warn!(sku = %tracked.product.sku(), error = %err, "Saving product failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed save failed");
                }
                return Err(err);
            }
        }
        tx.commit().await.inspect_err(|err| {
            if err.is_conflict() {
                metrics::counter!("uow_conflicts_total").increment(1);
            }
        })?;
        self.committed = true;
        debug!(products = self.seen.len(), "Session committed");
        Ok(())
    }

    /// Discards every write of this session.
    pub async fn rollback(mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        }
    }

    /// Returns true once `commit` succeeded.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    fn tx(&mut self) -> Result<&mut B::Tx> {
        self.tx.as_mut().ok_or(StoreError::SessionClosed)
    }
}

impl<B: Backend> Drop for Session<'_, B> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            // Dropping an open transaction discards its writes.
            drop(tx);
            if !self.seen.is_empty() {
                debug!(products = self.seen.len(), "Session ended without commit, rolled back");
            }
        }
        let touched = std::mem::take(&mut self.seen);
        self.uow
            .lock_seen()
            .extend(touched.into_iter().map(|tracked| tracked.product));
    }
}
