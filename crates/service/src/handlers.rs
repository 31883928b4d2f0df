//! Command and event handlers.
//!
//! Each handler takes its message and the collaborators it declared when it
//! was registered (see [`crate::bootstrap`]). Handlers that change state open
//! a session on the unit of work and commit it themselves; the bus collects
//! what the touched products recorded once the handler returns.

use domain::{
    Allocate, Allocated, Batch, ChangeBatchQuantity, CreateBatch, Deallocated, DomainError, Event,
    OrderLine, OutOfStock, Product,
};
use store::{AllocationView, Backend};
use tracing::{info, warn};

use crate::bus::CommandOutcome;
use crate::error::{Result, ServiceError};
use crate::registry::Injected;

/// Registers a new batch, creating its product on first sight of the SKU.
///
/// # Errors
///
/// Returns `DuplicateBatch` if any product already owns the reference.
#[tracing::instrument(skip_all, fields(sku = %command.sku, batch_reference = %command.reference))]
pub async fn add_batch<B: Backend>(command: CreateBatch, deps: Injected<B>) -> Result<CommandOutcome> {
    let uow = deps.uow()?;
    let mut session = uow.begin().await?;
    let mut products = session.products()?;

    if let Some(owner) = products.get_by_batch_reference(&command.reference).await? {
        warn!(owner = %owner.sku(), "Batch reference already taken");
        return Err(DomainError::DuplicateBatch(command.reference).into());
    }

    let batch = Batch::new(command.reference, command.sku.clone(), command.quantity, command.eta);
    match products.get(&command.sku).await? {
        Some(product) => product.add_batch(batch)?,
        None => {
            info!("Creating product");
            products.add(Product::new(command.sku, vec![batch]));
        }
    }

    session.commit().await?;
    Ok(CommandOutcome::Completed)
}

/// Allocates an order line to the product's best batch.
///
/// # Errors
///
/// Returns `InvalidSku` if no product exists for the line's SKU.
#[tracing::instrument(skip_all, fields(sku = %command.sku, order_id = %command.order_id))]
pub async fn allocate<B: Backend>(command: Allocate, deps: Injected<B>) -> Result<CommandOutcome> {
    let uow = deps.uow()?;
    let line = OrderLine::new(command.order_id, command.sku, command.quantity);

    let mut session = uow.begin().await?;
    let mut products = session.products()?;
    let product = products
        .get(&line.sku)
        .await?
        .ok_or_else(|| ServiceError::InvalidSku(line.sku.clone()))?;
    let reference = product.allocate(line);
    session.commit().await?;

    match &reference {
        Some(_) => metrics::counter!("allocations_total").increment(1),
        None => metrics::counter!("out_of_stock_total").increment(1),
    }
    Ok(CommandOutcome::Allocated(reference))
}

/// Changes a batch's purchased quantity.
///
/// # Errors
///
/// Returns `UnknownBatch` if no product owns the batch.
#[tracing::instrument(skip_all, fields(batch_reference = %command.reference, quantity = command.quantity))]
pub async fn change_batch_quantity<B: Backend>(
    command: ChangeBatchQuantity,
    deps: Injected<B>,
) -> Result<CommandOutcome> {
    let uow = deps.uow()?;
    let mut session = uow.begin().await?;
    let mut products = session.products()?;
    let product = products
        .get_by_batch_reference(&command.reference)
        .await?
        .ok_or_else(|| DomainError::UnknownBatch(command.reference.clone()))?;
    product.change_batch_quantity(&command.reference, command.quantity)?;
    session.commit().await?;
    Ok(CommandOutcome::Completed)
}

/// Tells the stock team a SKU ran out. Delivery failures are logged and
/// swallowed.
#[tracing::instrument(skip_all, fields(sku = %event.sku))]
pub async fn send_out_of_stock_notification<B: Backend>(
    event: OutOfStock,
    deps: Injected<B>,
    recipient: &str,
) -> Result<()> {
    let notifier = deps.notifier()?;
    if let Err(err) = notifier
        .send(recipient, &format!("Out of stock for {}", event.sku))
        .await
    {
        warn!(recipient, error = %err, "Out-of-stock notification not delivered");
    }
    Ok(())
}

/// Publishes an allocation for other processes.
#[tracing::instrument(skip_all, fields(order_id = %event.order_id, batch_reference = %event.batch_reference))]
pub async fn publish_allocated_event<B: Backend>(
    event: Allocated,
    deps: Injected<B>,
    channel: &str,
) -> Result<()> {
    deps.publisher()?
        .publish(channel, &Event::Allocated(event))
        .await
}

/// Adds an allocation to the read model.
#[tracing::instrument(skip_all, fields(order_id = %event.order_id, sku = %event.sku))]
pub async fn add_allocation_to_read_model<B: Backend>(event: Allocated, deps: Injected<B>) -> Result<()> {
    let uow = deps.uow()?;
    let mut session = uow.begin().await?;
    session
        .insert_allocation_view(&AllocationView::new(
            event.order_id,
            event.sku,
            event.batch_reference,
        ))
        .await?;
    session.commit().await?;
    Ok(())
}

/// Removes a released allocation from the read model.
#[tracing::instrument(skip_all, fields(order_id = %event.order_id, sku = %event.sku))]
pub async fn remove_allocation_from_read_model<B: Backend>(
    event: Deallocated,
    deps: Injected<B>,
) -> Result<()> {
    let uow = deps.uow()?;
    let mut session = uow.begin().await?;
    session
        .delete_allocation_view(&event.order_id, &event.sku)
        .await?;
    session.commit().await?;
    Ok(())
}

/// Queues an `Allocate` command for a line bumped off its batch.
#[tracing::instrument(skip_all, fields(order_id = %event.order_id, sku = %event.sku))]
pub async fn reallocate<B: Backend>(event: Deallocated, deps: Injected<B>) -> Result<()> {
    let uow = deps.uow()?;
    let mut session = uow.begin().await?;
    let mut products = session.products()?;
    let product = products
        .get(&event.sku)
        .await?
        .ok_or_else(|| ServiceError::InvalidSku(event.sku.clone()))?;
    product.push_message(Allocate::new(event.order_id, event.sku, event.quantity));
    session.commit().await?;
    Ok(())
}

