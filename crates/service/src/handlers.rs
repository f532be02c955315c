//! Command and event handlers.
//!
//! Each handler opens a unit of work scope, loads or creates the product it
//! needs, runs one domain operation and commits. Event handlers that talk to
//! the outside world go through the [`Notifier`] and [`EventPublisher`] ports.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    Allocate, AllocatedData, AllocationRequestedData, Batch, BatchRef, ChangeBatchQuantity,
    Command, CreateBatch, Deallocate, DeallocatedData, DomainError, Event, OrderLine,
    OutOfStockData, Product,
};
use store::{UnitOfWork, UnitOfWorkExt};

use crate::error::{Result, ServiceError};
use crate::ports::{EventPublisher, LINE_ALLOCATED_CHANNEL, LINE_DEALLOCATED_CHANNEL, Notifier};

/// Result of a command handler, returned to the caller of the bus.
pub type CommandOutput = Option<BatchRef>;

/// Handles one kind of command.
#[async_trait]
pub trait CommandHandler<U: UnitOfWork>: Send + Sync {
    /// Handler name for logs and errors.
    fn name(&self) -> &'static str;

    async fn handle(&self, command: &Command, uow: &mut U) -> Result<CommandOutput>;
}

/// Handles one kind of event.
#[async_trait]
pub trait EventHandler<U: UnitOfWork>: Send + Sync {
    /// Handler name for logs and errors.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &Event, uow: &mut U) -> Result<()>;
}

// ============================================================================
// Command handlers
// ============================================================================

/// Adds a batch, creating its product on first sight of the sku.
#[tracing::instrument(skip(uow), fields(reference = %cmd.reference, sku = %cmd.sku))]
pub async fn add_batch<U: UnitOfWork>(cmd: &CreateBatch, uow: &mut U) -> Result<()> {
    let mut scope = uow.scope().await?;

    let product = match scope.get_product(&cmd.sku).await? {
        Some(product) => product,
        None => {
            tracing::info!("creating product for new sku");
            scope
                .add_product(Product::new(cmd.sku.clone(), Vec::new()))
                .await?
        }
    };
    product.add_batch(Batch::new(
        cmd.reference.clone(),
        cmd.sku.clone(),
        cmd.qty,
        cmd.eta,
    ))?;

    scope.commit().await?;
    Ok(())
}

/// Allocates an order line; `None` means the product is out of stock.
#[tracing::instrument(skip(uow), fields(orderid = %cmd.orderid, sku = %cmd.sku, qty = cmd.qty))]
pub async fn allocate<U: UnitOfWork>(cmd: &Allocate, uow: &mut U) -> Result<Option<BatchRef>> {
    allocate_line(cmd.line(), uow).await
}

/// Releases an order line and returns the batch it was allocated to.
#[tracing::instrument(skip(uow), fields(orderid = %cmd.orderid, sku = %cmd.sku))]
pub async fn deallocate<U: UnitOfWork>(cmd: &Deallocate, uow: &mut U) -> Result<BatchRef> {
    let line = cmd.line();
    let mut scope = uow.scope().await?;

    let product = scope
        .get_product(&line.sku)
        .await?
        .ok_or_else(|| ServiceError::InvalidSku {
            sku: line.sku.clone(),
        })?;
    let reference = product.deallocate(&line)?;

    scope.commit().await?;
    Ok(reference)
}

/// Changes a batch's purchased quantity, evicting lines if it shrank too far.
#[tracing::instrument(skip(uow), fields(reference = %cmd.reference, qty = cmd.qty))]
pub async fn change_batch_quantity<U: UnitOfWork>(
    cmd: &ChangeBatchQuantity,
    uow: &mut U,
) -> Result<()> {
    let mut scope = uow.scope().await?;

    let product = scope
        .get_product_by_batchref(&cmd.reference)
        .await?
        .ok_or_else(|| DomainError::BatchNotFound {
            reference: cmd.reference.clone(),
        })?;
    product.change_batch_quantity(&cmd.reference, cmd.qty)?;

    scope.commit().await?;
    Ok(())
}

async fn allocate_line<U: UnitOfWork>(line: OrderLine, uow: &mut U) -> Result<Option<BatchRef>> {
    let mut scope = uow.scope().await?;

    let product = scope
        .get_product(&line.sku)
        .await?
        .ok_or_else(|| ServiceError::InvalidSku {
            sku: line.sku.clone(),
        })?;
    let batchref = product.allocate(line);

    scope.commit().await?;

    match &batchref {
        Some(reference) => {
            metrics::counter!("allocations_total").increment(1);
            tracing::info!(batchref = %reference, "line allocated");
        }
        None => {
            metrics::counter!("out_of_stock_total").increment(1);
            tracing::info!("no batch can take the line");
        }
    }
    Ok(batchref)
}

// ============================================================================
// Event handlers
// ============================================================================

/// Allocates a line evicted from a shrunk batch.
#[tracing::instrument(skip(uow), fields(orderid = %event.orderid, sku = %event.sku))]
pub async fn reallocate<U: UnitOfWork>(event: &AllocationRequestedData, uow: &mut U) -> Result<()> {
    allocate_line(event.line(), uow).await?;
    Ok(())
}

/// Tells the stock team that a sku ran out.
#[tracing::instrument(skip(notifier))]
pub async fn send_out_of_stock_notification(
    event: &OutOfStockData,
    notifier: &dyn Notifier,
    destination: &str,
) -> Result<()> {
    notifier
        .send(destination, &format!("Out of stock for {}", event.sku))
        .await
}

/// Publishes an allocation to the outside world.
#[tracing::instrument(skip(publisher))]
pub async fn publish_allocated_event(
    event: &AllocatedData,
    publisher: &dyn EventPublisher,
) -> Result<()> {
    publisher
        .publish(LINE_ALLOCATED_CHANNEL, &Event::Allocated(event.clone()))
        .await
}

/// Publishes a deallocation to the outside world.
#[tracing::instrument(skip(publisher))]
pub async fn publish_deallocated_event(
    event: &DeallocatedData,
    publisher: &dyn EventPublisher,
) -> Result<()> {
    publisher
        .publish(LINE_DEALLOCATED_CHANNEL, &Event::Deallocated(event.clone()))
        .await
}

// ============================================================================
// Registrable handlers
// ============================================================================

fn unexpected(handler: &'static str, message: &'static str) -> ServiceError {
    ServiceError::UnexpectedMessage { handler, message }
}

/// Dispatches `CreateBatch` to [`add_batch`].
pub struct AddBatchHandler;

#[async_trait]
impl<U: UnitOfWork> CommandHandler<U> for AddBatchHandler {
    fn name(&self) -> &'static str {
        "add_batch"
    }

    async fn handle(&self, command: &Command, uow: &mut U) -> Result<CommandOutput> {
        let Command::CreateBatch(cmd) = command else {
            return Err(unexpected(
                CommandHandler::<U>::name(self),
                command.kind().as_str(),
            ));
        };
        add_batch(cmd, uow).await?;
        Ok(None)
    }
}

/// Dispatches `Allocate` to [`allocate`].
pub struct AllocateHandler;

#[async_trait]
impl<U: UnitOfWork> CommandHandler<U> for AllocateHandler {
    fn name(&self) -> &'static str {
        "allocate"
    }

    async fn handle(&self, command: &Command, uow: &mut U) -> Result<CommandOutput> {
        let Command::Allocate(cmd) = command else {
            return Err(unexpected(
                CommandHandler::<U>::name(self),
                command.kind().as_str(),
            ));
        };
        allocate(cmd, uow).await
    }
}

/// Dispatches `Deallocate` to [`deallocate`].
pub struct DeallocateHandler;

#[async_trait]
impl<U: UnitOfWork> CommandHandler<U> for DeallocateHandler {
    fn name(&self) -> &'static str {
        "deallocate"
    }

    async fn handle(&self, command: &Command, uow: &mut U) -> Result<CommandOutput> {
        let Command::Deallocate(cmd) = command else {
            return Err(unexpected(
                CommandHandler::<U>::name(self),
                command.kind().as_str(),
            ));
        };
        Ok(Some(deallocate(cmd, uow).await?))
    }
}

/// Dispatches `ChangeBatchQuantity` to [`change_batch_quantity`].
pub struct ChangeBatchQuantityHandler;

#[async_trait]
impl<U: UnitOfWork> CommandHandler<U> for ChangeBatchQuantityHandler {
    fn name(&self) -> &'static str {
        "change_batch_quantity"
    }

    async fn handle(&self, command: &Command, uow: &mut U) -> Result<CommandOutput> {
        let Command::ChangeBatchQuantity(cmd) = command else {
            return Err(unexpected(
                CommandHandler::<U>::name(self),
                command.kind().as_str(),
            ));
        };
        change_batch_quantity(cmd, uow).await?;
        Ok(None)
    }
}

/// Dispatches `AllocationRequested` to [`reallocate`].
pub struct ReallocateHandler;

#[async_trait]
impl<U: UnitOfWork> EventHandler<U> for ReallocateHandler {
    fn name(&self) -> &'static str {
        "reallocate"
    }

    async fn handle(&self, event: &Event, uow: &mut U) -> Result<()> {
        let Event::AllocationRequested(data) = event else {
            return Err(unexpected(
                EventHandler::<U>::name(self),
                event.kind().as_str(),
            ));
        };
        reallocate(data, uow).await
    }
}

/// Dispatches `OutOfStock` to [`send_out_of_stock_notification`].
pub struct OutOfStockNotificationHandler {
    notifier: Arc<dyn Notifier>,
    destination: String,
}

impl OutOfStockNotificationHandler {
    pub fn new(notifier: Arc<dyn Notifier>, destination: impl Into<String>) -> Self {
        Self {
            notifier,
            destination: destination.into(),
        }
    }
}

#[async_trait]
impl<U: UnitOfWork> EventHandler<U> for OutOfStockNotificationHandler {
    fn name(&self) -> &'static str {
        "send_out_of_stock_notification"
    }

    async fn handle(&self, event: &Event, _uow: &mut U) -> Result<()> {
        let Event::OutOfStock(data) = event else {
            return Err(unexpected(
                EventHandler::<U>::name(self),
                event.kind().as_str(),
            ));
        };
        send_out_of_stock_notification(data, self.notifier.as_ref(), &self.destination).await
    }
}

/// Dispatches `Allocated` to [`publish_allocated_event`].
pub struct PublishAllocatedHandler {
    publisher: Arc<dyn EventPublisher>,
}

impl PublishAllocatedHandler {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl<U: UnitOfWork> EventHandler<U> for PublishAllocatedHandler {
    fn name(&self) -> &'static str {
        "publish_allocated_event"
    }

    async fn handle(&self, event: &Event, _uow: &mut U) -> Result<()> {
        let Event::Allocated(data) = event else {
            return Err(unexpected(
                EventHandler::<U>::name(self),
                event.kind().as_str(),
            ));
        };
        publish_allocated_event(data, self.publisher.as_ref()).await
    }
}

/// Dispatches `Deallocated` to [`publish_deallocated_event`].
pub struct PublishDeallocatedHandler {
    publisher: Arc<dyn EventPublisher>,
}

impl PublishDeallocatedHandler {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl<U: UnitOfWork> EventHandler<U> for PublishDeallocatedHandler {
    fn name(&self) -> &'static str {
        "publish_deallocated_event"
    }

    async fn handle(&self, event: &Event, _uow: &mut U) -> Result<()> {
        let Event::Deallocated(data) = event else {
            return Err(unexpected(
                EventHandler::<U>::name(self),
                event.kind().as_str(),
            ));
        };
        publish_deallocated_event(data, self.publisher.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{InMemoryNotifier, InMemoryPublisher};
    use domain::{EventKind, Sku};
    use store::{InMemoryProductStore, InMemoryUnitOfWork, UnitOfWorkFactory};

    fn new_uow() -> (InMemoryProductStore, InMemoryUnitOfWork) {
        let store = InMemoryProductStore::new();
        let uow = store.create();
        (store, uow)
    }

    #[tokio::test]
    async fn test_add_batch_for_new_product() {
        let (store, mut uow) = new_uow();

        add_batch(&CreateBatch::new("b1", "CRUNCHY-ARMCHAIR", 100, None), &mut uow)
            .await
            .unwrap();

        let product = store.get(&Sku::new("CRUNCHY-ARMCHAIR")).await.unwrap();
        assert_eq!(product.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_add_batch_for_existing_product() {
        let (store, mut uow) = new_uow();

        add_batch(&CreateBatch::new("b1", "GARISH-RUG", 100, None), &mut uow)
            .await
            .unwrap();
        add_batch(&CreateBatch::new("b2", "GARISH-RUG", 99, None), &mut uow)
            .await
            .unwrap();

        let product = store.get(&Sku::new("GARISH-RUG")).await.unwrap();
        let references: Vec<&str> = product
            .batches()
            .iter()
            .map(|b| b.reference().as_str())
            .collect();
        assert_eq!(references, vec!["b1", "b2"]);
    }

    #[tokio::test]
    async fn test_allocate_returns_allocation() {
        let (_store, mut uow) = new_uow();
        add_batch(&CreateBatch::new("batch1", "COMPLICATED-LAMP", 100, None), &mut uow)
            .await
            .unwrap();

        let result = allocate(&Allocate::new("o1", "COMPLICATED-LAMP", 10), &mut uow)
            .await
            .unwrap();

        assert_eq!(result, Some(BatchRef::new("batch1")));
        let events: Vec<EventKind> = uow.collect_new_events().iter().map(Event::kind).collect();
        assert_eq!(events, vec![EventKind::Allocated]);
    }

    #[tokio::test]
    async fn test_allocate_errors_for_invalid_sku() {
        let (_store, mut uow) = new_uow();
        add_batch(&CreateBatch::new("b1", "AREALSKU", 100, None), &mut uow)
            .await
            .unwrap();

        let err = allocate(&Allocate::new("o1", "NONEXISTENTSKU", 10), &mut uow)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidSku { .. }));
        assert_eq!(err.to_string(), "Invalid sku NONEXISTENTSKU");
    }

    #[tokio::test]
    async fn test_deallocate_unknown_line() {
        let (store, mut uow) = new_uow();
        add_batch(&CreateBatch::new("b1", "BLUE-PLINTH", 100, None), &mut uow)
            .await
            .unwrap();
        allocate(&Allocate::new("o1", "BLUE-PLINTH", 10), &mut uow)
            .await
            .unwrap();

        let err = deallocate(&Deallocate::new("o2", "BLUE-PLINTH", 10), &mut uow)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::OrderNotFound { .. })
        ));
        let product = store.get(&Sku::new("BLUE-PLINTH")).await.unwrap();
        assert_eq!(product.batches()[0].available_quantity(), 90);
    }

    #[tokio::test]
    async fn test_deallocate_releases_stock() {
        let (store, mut uow) = new_uow();
        add_batch(&CreateBatch::new("b1", "BLUE-PLINTH", 100, None), &mut uow)
            .await
            .unwrap();
        allocate(&Allocate::new("o1", "BLUE-PLINTH", 10), &mut uow)
            .await
            .unwrap();

        let reference = deallocate(&Deallocate::new("o1", "BLUE-PLINTH", 10), &mut uow)
            .await
            .unwrap();

        assert_eq!(reference.as_str(), "b1");
        let product = store.get(&Sku::new("BLUE-PLINTH")).await.unwrap();
        assert_eq!(product.batches()[0].available_quantity(), 100);
    }

    #[tokio::test]
    async fn test_change_quantity_of_unknown_batch() {
        let (_store, mut uow) = new_uow();

        let err = change_batch_quantity(&ChangeBatchQuantity::new("nope", 10), &mut uow)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::BatchNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_out_of_stock_notification() {
        let notifier = InMemoryNotifier::new();
        send_out_of_stock_notification(
            &OutOfStockData {
                sku: Sku::new("POPULAR-CURTAINS"),
            },
            &notifier,
            "stock@made.com",
        )
        .await
        .unwrap();

        assert_eq!(
            notifier.sent_to("stock@made.com"),
            vec!["Out of stock for POPULAR-CURTAINS".to_string()]
        );
    }

    #[tokio::test]
    async fn test_publish_deallocated_event() {
        let publisher = InMemoryPublisher::new();
        let data = DeallocatedData {
            orderid: "o1".into(),
            sku: "LAMP".into(),
            qty: 1,
            batchref: "b1".into(),
        };

        publish_deallocated_event(&data, &publisher).await.unwrap();

        assert_eq!(publisher.published_on(LINE_DEALLOCATED_CHANNEL).len(), 1);
    }

    #[tokio::test]
    async fn test_handler_rejects_other_message() {
        let (_store, mut uow) = new_uow();
        let command = Command::from(Allocate::new("o1", "LAMP", 1));

        let err = CommandHandler::handle(&AddBatchHandler, &command, &mut uow)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::UnexpectedMessage {
                handler: "add_batch",
                message: "Allocate",
            }
        ));
    }
}
