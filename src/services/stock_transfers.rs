use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::{
    config::DocumentNumberConfig,
    entities::{
        inventory_transaction::TransactionReference,
        stock_transfer::{self, Entity as StockTransferEntity, StockTransferStatus},
        stock_transfer_item::{self, Entity as StockTransferItemEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::format_document_number,
    services::inventory::{InventoryService, MovementMetadata},
};

#[derive(Debug, Clone)]
pub struct NewStockTransfer {
    pub source_warehouse_id: i64,
    pub destination_warehouse_id: i64,
    pub transfer_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewStockTransferItem {
    pub product_id: i64,
    pub quantity: Decimal,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// Stock transfer lifecycle. Unlike purchase and sales orders, approval
/// immediately and synchronously moves the stock: a transfer is a single
/// physical event, not an incremental series of deliveries.
#[derive(Clone)]
pub struct StockTransferService {
    db: Arc<DatabaseConnection>,
    inventory: Arc<InventoryService>,
    event_sender: Option<EventSender>,
    numbering: DocumentNumberConfig,
}

impl StockTransferService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: Arc<InventoryService>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            inventory,
            event_sender,
            numbering: DocumentNumberConfig::default(),
        }
    }

    pub fn with_numbering(mut self, numbering: DocumentNumberConfig) -> Self {
        self.numbering = numbering;
        self
    }

    /// Creates a draft transfer with its items; no ledger effect.
    #[instrument(skip(self, transfer, items))]
    pub async fn create_draft(
        &self,
        transfer: NewStockTransfer,
        items: Vec<NewStockTransferItem>,
        actor_id: i64,
    ) -> Result<stock_transfer::Model, ServiceError> {
        if transfer.source_warehouse_id == transfer.destination_warehouse_id {
            return Err(ServiceError::ValidationError(
                "source and destination warehouse must differ".to_string(),
            ));
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let last_id = StockTransferEntity::find()
            .order_by_desc(stock_transfer::Column::Id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .map_or(0, |t| t.id);
        let transfer_number = format_document_number(
            &self.numbering.stock_transfer,
            self.numbering.width,
            last_id + 1,
        );

        let created = stock_transfer::ActiveModel {
            transfer_number: Set(transfer_number),
            source_warehouse_id: Set(transfer.source_warehouse_id),
            destination_warehouse_id: Set(transfer.destination_warehouse_id),
            transfer_date: Set(transfer.transfer_date),
            status: Set(StockTransferStatus::Draft.as_str().to_string()),
            notes: Set(transfer.notes),
            created_by: Set(actor_id),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        for item in items {
            stock_transfer_item::ActiveModel {
                stock_transfer_id: Set(created.id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                batch_number: Set(item.batch_number),
                expiry_date: Set(item.expiry_date),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            stock_transfer_id = created.id,
            transfer_number = %created.transfer_number,
            "stock transfer drafted"
        );
        Ok(created)
    }

    /// Approves a draft or pending transfer and processes it at once.
    ///
    /// Returns `Ok(true)` when every item moved and the transfer reached
    /// `completed`; `Ok(false)` when some item failed — items that did
    /// move stay moved, and the transfer stays `approved`.
    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        stock_transfer_id: i64,
        actor_id: i64,
    ) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let transfer = StockTransferEntity::find_by_id(stock_transfer_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Stock transfer {} not found", stock_transfer_id))
            })?;

        let status = transfer.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "stock transfer {} has unknown status '{}'",
                stock_transfer_id, transfer.status
            ))
        })?;

        if !status.is_approvable() {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "stock transfer {} cannot be approved from status '{}'",
                stock_transfer_id, status
            )));
        }

        let mut active: stock_transfer::ActiveModel = transfer.into();
        active.status = Set(StockTransferStatus::Approved.as_str().to_string());
        active.approved_by = Set(Some(actor_id));
        active.approved_at = Set(Some(Utc::now()));
        active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockTransferApproved(stock_transfer_id))
                .await;
        }

        info!(stock_transfer_id, approved_by = actor_id, "stock transfer approved");

        self.process_transfer(stock_transfer_id, actor_id).await
    }

    /// Cancels a draft or pending transfer.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        stock_transfer_id: i64,
        actor_id: i64,
    ) -> Result<stock_transfer::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let transfer = StockTransferEntity::find_by_id(stock_transfer_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Stock transfer {} not found", stock_transfer_id))
            })?;

        let status = transfer.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "stock transfer {} has unknown status '{}'",
                stock_transfer_id, transfer.status
            ))
        })?;

        if !status.is_approvable() {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "stock transfer {} cannot be cancelled from status '{}'",
                stock_transfer_id, status
            )));
        }

        let mut active: stock_transfer::ActiveModel = transfer.into();
        active.status = Set(StockTransferStatus::Cancelled.as_str().to_string());
        let updated = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockTransferCancelled(stock_transfer_id))
                .await;
        }

        info!(stock_transfer_id, "stock transfer cancelled");
        Ok(updated)
    }

    /// Moves stock for every item of an approved transfer.
    ///
    /// Each item is its own atomic movement; a failed item is logged and
    /// skipped while earlier items stay committed. Only a fully
    /// successful pass advances the transfer to `completed`.
    #[instrument(skip(self))]
    pub async fn process_transfer(
        &self,
        stock_transfer_id: i64,
        actor_id: i64,
    ) -> Result<bool, ServiceError> {
        let db = &*self.db;

        let transfer = StockTransferEntity::find_by_id(stock_transfer_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Stock transfer {} not found", stock_transfer_id))
            })?;

        if transfer.status() != Some(StockTransferStatus::Approved) {
            return Err(ServiceError::InvalidOperation(format!(
                "stock transfer {} is not approved (status '{}')",
                stock_transfer_id, transfer.status
            )));
        }

        let items = StockTransferItemEntity::find()
            .filter(stock_transfer_item::Column::StockTransferId.eq(stock_transfer_id))
            .order_by_asc(stock_transfer_item::Column::Id)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut success = true;

        for item in items {
            let result = self
                .inventory
                .transfer_stock(
                    item.product_id,
                    transfer.source_warehouse_id,
                    transfer.destination_warehouse_id,
                    item.quantity,
                    MovementMetadata {
                        batch_number: item.batch_number.clone(),
                        expiry_date: item.expiry_date,
                    },
                    TransactionReference::StockTransfer(stock_transfer_id),
                    actor_id,
                )
                .await;

            if let Err(e) = result {
                error!(
                    stock_transfer_id,
                    item_id = item.id,
                    product_id = item.product_id,
                    error = %e,
                    "stock transfer item failed"
                );
                success = false;
            }
        }

        if success {
            let mut active: stock_transfer::ActiveModel = transfer.into();
            active.status = Set(StockTransferStatus::Completed.as_str().to_string());
            active
                .update(db)
                .await
                .map_err(ServiceError::DatabaseError)?;

            if let Some(sender) = &self.event_sender {
                sender
                    .send_or_log(Event::StockTransferCompleted(stock_transfer_id))
                    .await;
            }

            info!(stock_transfer_id, "stock transfer completed");
        }

        Ok(success)
    }
}
