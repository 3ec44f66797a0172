use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    config::DocumentNumberConfig,
    entities::{
        inventory_transaction::{TransactionReference, TransactionType},
        purchase_order::{self, Entity as PurchaseOrderEntity, PurchaseOrderStatus},
        purchase_order_item::{
            self, Entity as PurchaseOrderItemEntity, PurchaseOrderItemStatus,
        },
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::format_document_number,
    services::inventory::{add_to_level, record_transaction, NewTransaction},
};

/// Draft order header fields supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct NewPurchaseOrder {
    pub supplier_name: Option<String>,
    pub warehouse_id: Option<i64>,
    pub po_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPurchaseOrderItem {
    pub product_id: i64,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
}

/// One line of a receipt: how much arrived against which order item.
#[derive(Debug, Clone)]
pub struct ReceiptLine {
    pub item_id: i64,
    pub quantity: Decimal,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// Derives the order status from its items' statuses.
///
/// `None` means "leave the order status unchanged": either there are no
/// items, or nothing has been received yet.
pub fn derive_purchase_order_status(
    item_statuses: &[PurchaseOrderItemStatus],
) -> Option<PurchaseOrderStatus> {
    if item_statuses.is_empty() {
        return None;
    }

    let complete = item_statuses
        .iter()
        .filter(|s| **s == PurchaseOrderItemStatus::ReceivedComplete)
        .count();
    let partial = item_statuses
        .iter()
        .filter(|s| **s == PurchaseOrderItemStatus::ReceivedPartial)
        .count();

    if complete == item_statuses.len() {
        Some(PurchaseOrderStatus::ReceivedComplete)
    } else if complete > 0 || partial > 0 {
        Some(PurchaseOrderStatus::ReceivedPartial)
    } else {
        None
    }
}

/// Purchase order lifecycle and goods receipt.
#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    numbering: DocumentNumberConfig,
}

impl PurchaseOrderService {
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

    /// Creates a draft order with its items. Drafts are pure data entry:
    /// no ledger row or transaction is touched here.
    #[instrument(skip(self, order, items))]
    pub async fn create_draft(
        &self,
        order: NewPurchaseOrder,
        items: Vec<NewPurchaseOrderItem>,
        actor_id: i64,
    ) -> Result<purchase_order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let last_id = PurchaseOrderEntity::find()
            .order_by_desc(purchase_order::Column::Id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .map_or(0, |po| po.id);
        let po_number = format_document_number(
            &self.numbering.purchase_order,
            self.numbering.width,
            last_id + 1,
        );

        let created = purchase_order::ActiveModel {
            po_number: Set(po_number),
            supplier_name: Set(order.supplier_name),
            warehouse_id: Set(order.warehouse_id),
            po_date: Set(order.po_date),
            expected_delivery_date: Set(order.expected_delivery_date),
            status: Set(PurchaseOrderStatus::Draft.as_str().to_string()),
            notes: Set(order.notes),
            created_by: Set(actor_id),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        for item in items {
            purchase_order_item::ActiveModel {
                purchase_order_id: Set(created.id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                received_quantity: Set(Decimal::ZERO),
                unit_price: Set(item.unit_price),
                status: Set(PurchaseOrderItemStatus::Pending.as_str().to_string()),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(purchase_order_id = created.id, po_number = %created.po_number, "purchase order drafted");
        Ok(created)
    }

    /// Approves a draft or pending order, recording who and when.
    ///
    /// Approval does not receive anything; receipts are separate explicit
    /// actions because deliveries arrive incrementally.
    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        purchase_order_id: i64,
        actor_id: i64,
    ) -> Result<purchase_order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = PurchaseOrderEntity::find_by_id(purchase_order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order {} not found", purchase_order_id))
            })?;

        let status = order.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "purchase order {} has unknown status '{}'",
                purchase_order_id, order.status
            ))
        })?;

        if !status.is_approvable() {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "purchase order {} cannot be approved from status '{}'",
                purchase_order_id, status
            )));
        }

        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Approved.as_str().to_string());
        active.approved_by = Set(Some(actor_id));
        active.approved_at = Set(Some(Utc::now()));
        let updated = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseOrderApproved(purchase_order_id))
                .await;
        }

        info!(purchase_order_id, approved_by = actor_id, "purchase order approved");
        Ok(updated)
    }

    /// Cancels a draft or pending order.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        purchase_order_id: i64,
        actor_id: i64,
    ) -> Result<purchase_order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = PurchaseOrderEntity::find_by_id(purchase_order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order {} not found", purchase_order_id))
            })?;

        let status = order.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "purchase order {} has unknown status '{}'",
                purchase_order_id, order.status
            ))
        })?;

        if !status.is_approvable() {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "purchase order {} cannot be cancelled from status '{}'",
                purchase_order_id, status
            )));
        }

        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Cancelled.as_str().to_string());
        let updated = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseOrderCancelled(purchase_order_id))
                .await;
        }

        info!(purchase_order_id, "purchase order cancelled");
        Ok(updated)
    }

    /// Records a goods receipt against order items and books the stock in.
    ///
    /// Per item: the requested quantity is clamped to what is still
    /// receivable, the ledger row for (product, warehouse) is upserted,
    /// and one `purchase` transaction is appended. The whole batch is one
    /// database transaction; any error rolls back every item.
    #[instrument(skip(self, lines))]
    pub async fn process_receipt(
        &self,
        purchase_order_id: i64,
        lines: Vec<ReceiptLine>,
        warehouse_id: Option<i64>,
        actor_id: i64,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = PurchaseOrderEntity::find_by_id(purchase_order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order {} not found", purchase_order_id))
            })?;

        let warehouse_id = warehouse_id.or(order.warehouse_id).ok_or_else(|| {
            error!(purchase_order_id, "no warehouse specified for receipt");
            ServiceError::ValidationError(format!(
                "no warehouse specified for receipt of purchase order {}",
                purchase_order_id
            ))
        })?;

        for line in lines {
            if line.quantity <= Decimal::ZERO {
                continue;
            }

            let item = PurchaseOrderItemEntity::find_by_id(line.item_id)
                .one(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .filter(|item| item.purchase_order_id == purchase_order_id)
                .ok_or_else(|| {
                    ServiceError::InvalidOperation(format!(
                        "item {} does not belong to purchase order {}",
                        line.item_id, purchase_order_id
                    ))
                })?;

            // Clamp to what is still receivable against this line.
            let receive = line.quantity.min(item.remaining());
            if receive <= Decimal::ZERO {
                continue;
            }

            let product_id = item.product_id;
            let new_received = item.received_quantity + receive;
            let new_status = if new_received >= item.quantity {
                PurchaseOrderItemStatus::ReceivedComplete
            } else {
                PurchaseOrderItemStatus::ReceivedPartial
            };

            let mut active: purchase_order_item::ActiveModel = item.into();
            active.received_quantity = Set(new_received);
            active.status = Set(new_status.as_str().to_string());
            active
                .update(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;

            add_to_level(&txn, product_id, warehouse_id, receive).await?;

            record_transaction(
                &txn,
                NewTransaction {
                    product_id,
                    warehouse_id,
                    transaction_type: TransactionType::Purchase,
                    reference: TransactionReference::PurchaseOrder(purchase_order_id),
                    quantity: receive,
                    batch_number: line.batch_number,
                    expiry_date: line.expiry_date,
                    notes: Some(format!("Purchase order: {}", order.po_number)),
                    created_by: actor_id,
                },
            )
            .await?;
        }

        // Roll the order status up from the item multiset.
        let items = PurchaseOrderItemEntity::find()
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(purchase_order_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let item_statuses: Vec<PurchaseOrderItemStatus> =
            items.iter().filter_map(|i| i.status()).collect();

        let order_status = order.status();
        if let Some(derived) = derive_purchase_order_status(&item_statuses) {
            let in_sync_scope = order_status.map_or(false, |s| s.is_post_approval());
            if in_sync_scope && order_status != Some(derived) {
                let mut active: purchase_order::ActiveModel = order.into();
                active.status = Set(derived.as_str().to_string());
                active
                    .update(&txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?;
            } else if !in_sync_scope {
                warn!(
                    purchase_order_id,
                    status = ?order_status,
                    "receipt recorded on order outside post-approval statuses; status left unchanged"
                );
            }
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseOrderReceived {
                    purchase_order_id,
                    warehouse_id,
                })
                .await;
        }

        info!(purchase_order_id, warehouse_id, "purchase order receipt processed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PurchaseOrderItemStatus::*;

    #[test]
    fn empty_order_keeps_status() {
        assert_eq!(derive_purchase_order_status(&[]), None);
    }

    #[test]
    fn untouched_items_keep_status() {
        assert_eq!(derive_purchase_order_status(&[Pending, Pending]), None);
    }

    #[test]
    fn all_complete_rolls_up_to_complete() {
        assert_eq!(
            derive_purchase_order_status(&[ReceivedComplete, ReceivedComplete]),
            Some(PurchaseOrderStatus::ReceivedComplete)
        );
    }

    #[test]
    fn any_progress_rolls_up_to_partial() {
        assert_eq!(
            derive_purchase_order_status(&[ReceivedPartial, Pending]),
            Some(PurchaseOrderStatus::ReceivedPartial)
        );
        assert_eq!(
            derive_purchase_order_status(&[ReceivedComplete, Pending]),
            Some(PurchaseOrderStatus::ReceivedPartial)
        );
    }

    #[test]
    fn cancelled_item_blocks_complete_rollup() {
        assert_eq!(
            derive_purchase_order_status(&[ReceivedComplete, Cancelled]),
            Some(PurchaseOrderStatus::ReceivedPartial)
        );
    }
}
