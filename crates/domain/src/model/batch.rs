//! Batch entity.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use common::{BatchReference, OrderId, Sku};

use super::OrderLine;
use crate::error::DomainError;

/// A purchased batch of stock for one product.
///
/// Identity is the reference alone: two batches with the same reference are
/// the same entity, whatever their other fields say.
#[derive(Debug, Clone)]
pub struct Batch {
    reference: BatchReference,
    sku: Sku,
    eta: Option<NaiveDate>,
    purchased_quantity: u32,
    allocations: HashSet<OrderLine>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new(
        reference: impl Into<BatchReference>,
        sku: impl Into<Sku>,
        purchased_quantity: u32,
        eta: Option<NaiveDate>,
    ) -> Self {
        Self {
            reference: reference.into(),
            sku: sku.into(),
            eta,
            purchased_quantity,
            allocations: HashSet::new(),
        }
    }

    /// Rebuilds a batch with existing allocations, as loaded from storage.
    ///
    /// Lines are restored as-is, without the availability check `allocate`
    /// applies.
    pub fn with_allocations(mut self, lines: impl IntoIterator<Item = OrderLine>) -> Self {
        self.allocations.extend(lines);
        self
    }

    pub fn reference(&self) -> &BatchReference {
        &self.reference
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    /// Expected arrival date; `None` for stock already in the warehouse.
    pub fn eta(&self) -> Option<NaiveDate> {
        self.eta
    }

    pub fn purchased_quantity(&self) -> u32 {
        self.purchased_quantity
    }

    /// Returns the allocated order lines, in no particular order.
    pub fn allocations(&self) -> impl Iterator<Item = &OrderLine> {
        self.allocations.iter()
    }

    /// Returns the ids of every order with a line in this batch.
    pub fn order_ids(&self) -> HashSet<&OrderId> {
        self.allocations.iter().map(|line| &line.order_id).collect()
    }

    pub fn allocated_quantity(&self) -> i64 {
        self.allocations
            .iter()
            .map(|line| i64::from(line.quantity))
            .sum()
    }

    /// Purchased minus allocated. Negative only after the purchased quantity
    /// was cut below what is allocated, until lines are released.
    pub fn available_quantity(&self) -> i64 {
        i64::from(self.purchased_quantity) - self.allocated_quantity()
    }

    pub fn can_allocate(&self, line: &OrderLine) -> bool {
        self.sku == line.sku && self.available_quantity() >= i64::from(line.quantity)
    }

    /// Allocates the line if it fits; does nothing otherwise.
    ///
    /// Allocating a line that is already allocated is a no-op.
    pub fn allocate(&mut self, line: OrderLine) {
        if self.can_allocate(&line) {
            self.allocations.insert(line);
        }
    }

    /// Releases the line if it is allocated here.
    pub fn deallocate(&mut self, line: &OrderLine) {
        self.allocations.remove(line);
    }

    /// Releases and returns an arbitrary allocated line.
    ///
    /// Which line comes out depends on hash-set iteration order and is not
    /// stable between runs.
    pub fn deallocate_one(&mut self) -> Result<OrderLine, DomainError> {
        let line = self
            .allocations
            .iter()
            .next()
            .cloned()
            .ok_or_else(|| DomainError::EmptyAllocationSet(self.reference.clone()))?;
        self.allocations.remove(&line);
        Ok(line)
    }

    pub(crate) fn set_purchased_quantity(&mut self, quantity: u32) {
        self.purchased_quantity = quantity;
    }
}

impl PartialEq for Batch {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl Eq for Batch {}

impl Hash for Batch {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reference.hash(state);
    }
}
