use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    config::DocumentNumberConfig,
    entities::{
        inventory_transaction::{TransactionReference, TransactionType},
        stock_adjustment::{
            self, AdjustmentReason, Entity as StockAdjustmentEntity, StockAdjustmentStatus,
        },
        stock_adjustment_item::{self, Entity as StockAdjustmentItemEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::format_document_number,
    services::inventory::record_transaction,
    services::inventory::NewTransaction,
};

#[derive(Debug, Clone)]
pub struct NewStockAdjustment {
    pub warehouse_id: i64,
    pub adjustment_date: Option<NaiveDate>,
    pub reason: AdjustmentReason,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewStockAdjustmentItem {
    pub product_id: i64,
    pub current_quantity: Decimal,
    pub new_quantity: Decimal,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// The signed delta an adjustment line applies, frozen at save time.
pub fn freeze_item_delta(current_quantity: Decimal, new_quantity: Decimal) -> Decimal {
    new_quantity - current_quantity
}

/// Stock adjustment lifecycle.
///
/// Approval appends the frozen deltas to the transaction log but does
/// NOT reconcile the ledger row: the counted quantity is expected to
/// have been entered on the inventory record directly. This asymmetry
/// with the other movement services is deliberate and covered by tests.
#[derive(Clone)]
pub struct StockAdjustmentService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    numbering: DocumentNumberConfig,
}

impl StockAdjustmentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self {
            db,
            event_sender,
            numbering: DocumentNumberConfig::default(),
        }
    }

    pub fn with_numbering(mut self, numbering: DocumentNumberConfig) -> Self {
        self.numbering = numbering;
        self
    }

    /// Creates a draft adjustment, freezing each line's delta; no ledger
    /// effect.
    #[instrument(skip(self, adjustment, items))]
    pub async fn create_draft(
        &self,
        adjustment: NewStockAdjustment,
        items: Vec<NewStockAdjustmentItem>,
        actor_id: i64,
    ) -> Result<stock_adjustment::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let last_id = StockAdjustmentEntity::find()
            .order_by_desc(stock_adjustment::Column::Id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .map_or(0, |a| a.id);
        let adjustment_number = format_document_number(
            &self.numbering.stock_adjustment,
            self.numbering.width,
            last_id + 1,
        );

        let created = stock_adjustment::ActiveModel {
            adjustment_number: Set(adjustment_number),
            warehouse_id: Set(adjustment.warehouse_id),
            adjustment_date: Set(adjustment.adjustment_date),
            reason: Set(adjustment.reason.as_str().to_string()),
            notes: Set(adjustment.notes),
            status: Set(StockAdjustmentStatus::Draft.as_str().to_string()),
            created_by: Set(actor_id),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        for item in items {
            let delta = freeze_item_delta(item.current_quantity, item.new_quantity);
            stock_adjustment_item::ActiveModel {
                stock_adjustment_id: Set(created.id),
                product_id: Set(item.product_id),
                current_quantity: Set(item.current_quantity),
                new_quantity: Set(item.new_quantity),
                quantity: Set(delta),
                batch_number: Set(item.batch_number),
                expiry_date: Set(item.expiry_date),
                notes: Set(item.notes),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            stock_adjustment_id = created.id,
            adjustment_number = %created.adjustment_number,
            "stock adjustment drafted"
        );
        Ok(created)
    }

    /// Approves a draft or pending adjustment and immediately writes its
    /// audit transactions.
    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        stock_adjustment_id: i64,
        actor_id: i64,
    ) -> Result<stock_adjustment::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let adjustment = StockAdjustmentEntity::find_by_id(stock_adjustment_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Stock adjustment {} not found",
                    stock_adjustment_id
                ))
            })?;

        let status = adjustment.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "stock adjustment {} has unknown status '{}'",
                stock_adjustment_id, adjustment.status
            ))
        })?;

        if !status.is_approvable() {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "stock adjustment {} cannot be approved from status '{}'",
                stock_adjustment_id, status
            )));
        }

        let mut active: stock_adjustment::ActiveModel = adjustment.into();
        active.status = Set(StockAdjustmentStatus::Approved.as_str().to_string());
        active.approved_by = Set(Some(actor_id));
        active.approved_at = Set(Some(Utc::now()));
        let updated = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockAdjustmentApproved(stock_adjustment_id))
                .await;
        }

        info!(stock_adjustment_id, approved_by = actor_id, "stock adjustment approved");

        self.process_adjustment(stock_adjustment_id, actor_id)
            .await?;

        Ok(updated)
    }

    /// Appends the frozen deltas of an approved adjustment to the
    /// transaction log, one record per line, in one database transaction.
    ///
    /// The ledger row itself is not touched here. Calling this a second
    /// time on the same adjustment appends the deltas again; the status
    /// guard in `approve` is the only thing preventing that in the normal
    /// workflow.
    #[instrument(skip(self))]
    pub async fn process_adjustment(
        &self,
        stock_adjustment_id: i64,
        actor_id: i64,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let adjustment = StockAdjustmentEntity::find_by_id(stock_adjustment_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Stock adjustment {} not found",
                    stock_adjustment_id
                ))
            })?;

        if adjustment.status() != Some(StockAdjustmentStatus::Approved) {
            return Err(ServiceError::InvalidOperation(format!(
                "stock adjustment {} is not approved (status '{}')",
                stock_adjustment_id, adjustment.status
            )));
        }

        let items = StockAdjustmentItemEntity::find()
            .filter(stock_adjustment_item::Column::StockAdjustmentId.eq(stock_adjustment_id))
            .order_by_asc(stock_adjustment_item::Column::Id)
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        for item in items {
            let transaction_type = if item.quantity >= Decimal::ZERO {
                TransactionType::AdjustmentAdd
            } else {
                TransactionType::AdjustmentRemove
            };

            record_transaction(
                &txn,
                NewTransaction {
                    product_id: item.product_id,
                    warehouse_id: adjustment.warehouse_id,
                    transaction_type,
                    reference: TransactionReference::StockAdjustment(stock_adjustment_id),
                    quantity: item.quantity,
                    batch_number: item.batch_number.clone(),
                    expiry_date: item.expiry_date,
                    notes: Some(format!(
                        "Stock adjustment: {} - {}",
                        adjustment.adjustment_number, adjustment.reason
                    )),
                    created_by: actor_id,
                },
            )
            .await?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockAdjustmentProcessed(stock_adjustment_id))
                .await;
        }

        info!(stock_adjustment_id, "stock adjustment transactions logged");
        Ok(())
    }

    /// Cancels a draft or pending adjustment.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        stock_adjustment_id: i64,
        actor_id: i64,
    ) -> Result<stock_adjustment::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let adjustment = StockAdjustmentEntity::find_by_id(stock_adjustment_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Stock adjustment {} not found",
                    stock_adjustment_id
                ))
            })?;

        let status = adjustment.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "stock adjustment {} has unknown status '{}'",
                stock_adjustment_id, adjustment.status
            ))
        })?;

        if !status.is_approvable() {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "stock adjustment {} cannot be cancelled from status '{}'",
                stock_adjustment_id, status
            )));
        }

        let mut active: stock_adjustment::ActiveModel = adjustment.into();
        active.status = Set(StockAdjustmentStatus::Cancelled.as_str().to_string());
        let updated = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockAdjustmentCancelled(stock_adjustment_id))
                .await;
        }

        info!(stock_adjustment_id, "stock adjustment cancelled");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::freeze_item_delta;
    use rust_decimal_macros::dec;

    #[test]
    fn delta_is_new_minus_current() {
        assert_eq!(freeze_item_delta(dec!(10), dec!(25)), dec!(15));
        assert_eq!(freeze_item_delta(dec!(25), dec!(10)), dec!(-15));
        assert_eq!(freeze_item_delta(dec!(5), dec!(5)), dec!(0));
    }
}
