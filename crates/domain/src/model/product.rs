//! Product aggregate root.

use std::collections::VecDeque;

use common::{BatchReference, Sku, Version};
use tracing::{debug, info};

use super::{Batch, OrderLine};
use crate::error::{DomainError, Result};
use crate::messages::{Allocated, Deallocated, Message, OutOfStock};

/// All the stock of one SKU, and the consistency boundary for allocating it.
///
/// Every change to the product's batches goes through this type. Changes
/// record what happened as messages in a pending queue; the unit of work
/// drains that queue after the handler that made the change returns.
///
/// `version_number` is the optimistic-concurrency token. It goes up by one on
/// every successful allocation, and the store refuses to persist a product
/// whose stored version moved since it was loaded.
#[derive(Debug, Clone)]
pub struct Product {
    sku: Sku,
    batches: Vec<Batch>,
    version_number: Version,
    pending: VecDeque<Message>,
}

impl Product {
    /// Creates a product with the given batches at the initial version.
    pub fn new(sku: impl Into<Sku>, batches: Vec<Batch>) -> Self {
        Self::with_version(sku, batches, Version::initial())
    }

    /// Rebuilds a product at a known version, as loaded from storage.
    pub fn with_version(sku: impl Into<Sku>, batches: Vec<Batch>, version_number: Version) -> Self {
        Self {
            sku: sku.into(),
            batches,
            version_number,
            pending: VecDeque::new(),
        }
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn version_number(&self) -> Version {
        self.version_number
    }

    /// Returns the batches in insertion order.
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Looks up one of this product's batches.
    pub fn batch(&self, reference: &BatchReference) -> Option<&Batch> {
        self.batches.iter().find(|b| b.reference() == reference)
    }

    /// Adds a batch to the product.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateBatch` if the product already owns a batch with the
    /// same reference.
    pub fn add_batch(&mut self, batch: Batch) -> Result<()> {
        if self.batches.contains(&batch) {
            return Err(DomainError::DuplicateBatch(batch.reference().clone()));
        }
        self.batches.push(batch);
        Ok(())
    }

    /// Allocates a line to the first batch that can take it.
    ///
    /// Batches without an ETA are tried before dated ones, and earlier ETAs
    /// before later ones. Batches with the same ETA keep insertion order.
    ///
    /// On success the version goes up and an `Allocated` event is queued. When
    /// nothing fits, an `OutOfStock` event is queued and `None` is returned.
    pub fn allocate(&mut self, line: OrderLine) -> Option<BatchReference> {
        let Some(batch) = self
            .batches
            .iter_mut()
            .filter(|b| b.can_allocate(&line))
            .min_by_key(|b| b.eta())
        else {
            debug!(sku = %self.sku, order_id = %line.order_id, "No batch can take the line");
            self.push_message(OutOfStock {
                sku: line.sku.clone(),
            });
            return None;
        };

        let reference = batch.reference().clone();
        batch.allocate(line.clone());
        self.version_number = self.version_number.next();

        info!(
            sku = %self.sku,
            order_id = %line.order_id,
            batch_reference = %reference,
            version = %self.version_number,
            "Order line allocated"
        );

        self.push_message(Allocated {
            order_id: line.order_id,
            sku: line.sku,
            quantity: line.quantity,
            batch_reference: reference.clone(),
        });
        Some(reference)
    }

    /// Sets a batch's purchased quantity, bumping allocated lines off it until
    /// the allocations fit again.
    ///
    /// Each bumped line is released and reported in a `Deallocated` event so
    /// it can be allocated again. Which lines get bumped is arbitrary.
    ///
    /// # Errors
    ///
    /// Returns `UnknownBatch` if the product has no batch with that reference.
    pub fn change_batch_quantity(&mut self, reference: &BatchReference, quantity: u32) -> Result<()> {
        let batch = self
            .batches
            .iter_mut()
            .find(|b| b.reference() == reference)
            .ok_or_else(|| DomainError::UnknownBatch(reference.clone()))?;

        batch.set_purchased_quantity(quantity);

        let mut bumped = Vec::new();
        while batch.available_quantity() < 0 {
            bumped.push(batch.deallocate_one()?);
        }

        info!(
            sku = %self.sku,
            batch_reference = %reference,
            quantity,
            bumped = bumped.len(),
            "Batch quantity changed"
        );

        for line in bumped {
            self.push_message(Deallocated {
                order_id: line.order_id,
                sku: line.sku,
                quantity: line.quantity,
            });
        }
        Ok(())
    }

    /// Queues a message for the bus to pick up after the current handler.
    pub fn push_message(&mut self, message: impl Into<Message>) {
        self.pending.push_back(message.into());
    }

    /// Messages queued and not yet collected, oldest first.
    pub fn pending_messages(&self) -> impl Iterator<Item = &Message> {
        self.pending.iter()
    }

    /// Removes and returns the oldest pending message.
    pub fn pop_message(&mut self) -> Option<Message> {
        self.pending.pop_front()
    }

    /// Drains every pending message, oldest first.
    pub fn take_messages(&mut self) -> Vec<Message> {
        self.pending.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::messages::{Allocate, Event};

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn prefers_warehouse_batches_to_shipments() {
        let in_stock = Batch::new("in-stock-batch", "RETRO-CLOCK", 100, None);
        let shipment = Batch::new("shipment-batch", "RETRO-CLOCK", 100, date(2025, 1, 2));
        let mut product = Product::new("RETRO-CLOCK", vec![shipment, in_stock]);

        let reference = product.allocate(OrderLine::new("oref", "RETRO-CLOCK", 10));

        assert_eq!(reference, Some(BatchReference::new("in-stock-batch")));
        assert_eq!(product.batches()[1].available_quantity(), 90);
        assert_eq!(product.batches()[0].available_quantity(), 100);
    }

    #[test]
    fn prefers_earlier_batches() {
        let earliest = Batch::new("speedy-batch", "MINIMALIST-SPOON", 100, date(2025, 1, 1));
        let medium = Batch::new("normal-batch", "MINIMALIST-SPOON", 100, date(2025, 1, 2));
        let latest = Batch::new("slow-batch", "MINIMALIST-SPOON", 100, date(2025, 1, 3));
        let mut product = Product::new("MINIMALIST-SPOON", vec![medium, latest, earliest]);

        let reference = product.allocate(OrderLine::new("order1", "MINIMALIST-SPOON", 10));

        assert_eq!(reference, Some(BatchReference::new("speedy-batch")));
    }

    #[test]
    fn skips_batches_that_cannot_take_the_line() {
        let small = Batch::new("small", "LAMP", 1, None);
        let big = Batch::new("big", "LAMP", 100, date(2025, 1, 2));
        let mut product = Product::new("LAMP", vec![small, big]);

        let reference = product.allocate(OrderLine::new("o1", "LAMP", 5));

        assert_eq!(reference, Some(BatchReference::new("big")));
    }

    #[test]
    fn equal_etas_keep_insertion_order() {
        let first = Batch::new("first", "LAMP", 10, None);
        let second = Batch::new("second", "LAMP", 10, None);
        let mut product = Product::new("LAMP", vec![first, second]);

        assert_eq!(
            product.allocate(OrderLine::new("o1", "LAMP", 1)),
            Some(BatchReference::new("first"))
        );
    }

    #[test]
    fn records_allocated_event() {
        let batch = Batch::new("b1", "LAMP", 10, None);
        let mut product = Product::new("LAMP", vec![batch]);

        product.allocate(OrderLine::new("o1", "LAMP", 2));

        let messages = product.take_messages();
        assert_eq!(
            messages,
            vec![Message::from(Allocated {
                order_id: "o1".into(),
                sku: "LAMP".into(),
                quantity: 2,
                batch_reference: "b1".into(),
            })]
        );
    }

    #[test]
    fn records_out_of_stock_event_if_cannot_allocate() {
        let batch = Batch::new("batch1", "SMALL-FORK", 10, None);
        let mut product = Product::new("SMALL-FORK", vec![batch]);
        product.allocate(OrderLine::new("order1", "SMALL-FORK", 10));
        product.take_messages();

        let reference = product.allocate(OrderLine::new("order2", "SMALL-FORK", 1));

        assert_eq!(reference, None);
        assert_eq!(
            product.take_messages(),
            vec![Message::from(OutOfStock {
                sku: "SMALL-FORK".into()
            })]
        );
    }

    #[test]
    fn increments_version_number_only_on_success() {
        let batch = Batch::new("b1", "SCANDI-PEN", 10, None);
        let mut product = Product::with_version("SCANDI-PEN", vec![batch], Version::new(7));

        product.allocate(OrderLine::new("o1", "SCANDI-PEN", 10));
        assert_eq!(product.version_number(), Version::new(8));

        product.allocate(OrderLine::new("o2", "SCANDI-PEN", 10));
        assert_eq!(product.version_number(), Version::new(8));
    }

    #[test]
    fn add_batch_rejects_duplicate_reference() {
        let mut product = Product::new("LAMP", vec![Batch::new("b1", "LAMP", 10, None)]);

        let err = product
            .add_batch(Batch::new("b1", "LAMP", 99, None))
            .unwrap_err();

        assert_eq!(err, DomainError::DuplicateBatch("b1".into()));
        assert_eq!(product.batches().len(), 1);
    }

    #[test]
    fn change_batch_quantity_unknown_batch() {
        let mut product = Product::new("LAMP", vec![]);
        let err = product
            .change_batch_quantity(&"nope".into(), 5)
            .unwrap_err();
        assert_eq!(err, DomainError::UnknownBatch("nope".into()));
    }

    #[test]
    fn change_batch_quantity_without_overflow_emits_nothing() {
        let mut product = Product::new("LAMP", vec![Batch::new("b1", "LAMP", 10, None)]);
        product.allocate(OrderLine::new("o1", "LAMP", 4));
        product.take_messages();

        product.change_batch_quantity(&"b1".into(), 5).unwrap();

        assert_eq!(product.batch(&"b1".into()).unwrap().available_quantity(), 1);
        assert_eq!(product.pending_messages().count(), 0);
    }

    #[test]
    fn change_batch_quantity_bumps_lines_until_allocations_fit() {
        let mut product = Product::new("LAMP", vec![Batch::new("b1", "LAMP", 20, None)]);
        product.allocate(OrderLine::new("o1", "LAMP", 10));
        product.allocate(OrderLine::new("o2", "LAMP", 10));
        product.take_messages();
        let version = product.version_number();

        product.change_batch_quantity(&"b1".into(), 15).unwrap();

        let batch = product.batch(&"b1".into()).unwrap();
        assert_eq!(batch.available_quantity(), 5);
        assert_eq!(batch.allocations().count(), 1);
        let kept: Vec<OrderLine> = batch.allocations().cloned().collect();
        assert_eq!(product.version_number(), version);

        let messages = product.take_messages();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            Message::Event(Event::Deallocated(deallocated)) => {
                assert_eq!(deallocated.quantity, 10);
                assert_eq!(deallocated.sku, Sku::new("LAMP"));
                assert_ne!(kept[0].order_id, deallocated.order_id);
            }
            other => panic!("expected Deallocated, got {other:?}"),
        }
    }

    #[test]
    fn change_batch_quantity_to_zero_bumps_every_line() {
        let mut product = Product::new("LAMP", vec![Batch::new("b1", "LAMP", 20, None)]);
        for order in ["o1", "o2", "o3"] {
            product.allocate(OrderLine::new(order, "LAMP", 2));
        }
        product.take_messages();

        product.change_batch_quantity(&"b1".into(), 0).unwrap();

        assert_eq!(product.batch(&"b1".into()).unwrap().available_quantity(), 0);
        assert_eq!(product.take_messages().len(), 3);
    }

    #[test]
    fn pending_messages_drain_in_fifo_order() {
        let mut product = Product::new("LAMP", vec![Batch::new("b1", "LAMP", 1, None)]);
        product.allocate(OrderLine::new("o1", "LAMP", 1));
        product.allocate(OrderLine::new("o2", "LAMP", 1));
        product.push_message(Allocate::new("o3", "LAMP", 1));

        let names: Vec<_> = product.pending_messages().map(Message::name).collect();
        assert_eq!(names, ["Allocated", "OutOfStock", "Allocate"]);

        assert_eq!(product.pop_message().map(|m| m.name()), Some("Allocated"));
        assert_eq!(product.take_messages().len(), 2);
        assert!(product.pop_message().is_none());
    }
}
