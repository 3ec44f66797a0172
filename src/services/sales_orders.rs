use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    config::DocumentNumberConfig,
    entities::{
        inventory_level::{self, Entity as InventoryLevelEntity},
        inventory_transaction::{TransactionReference, TransactionType},
        sales_order::{self, Entity as SalesOrderEntity, SalesOrderStatus},
        sales_order_item::{self, Entity as SalesOrderItemEntity, SalesOrderItemStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::format_document_number,
    services::inventory::{deduct_from_level, record_transaction, NewTransaction},
};

#[derive(Debug, Clone, Default)]
pub struct NewSalesOrder {
    pub customer_name: Option<String>,
    pub warehouse_id: Option<i64>,
    pub order_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSalesOrderItem {
    pub product_id: i64,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
}

/// Derives the order status from its items' statuses. `None` leaves the
/// order status unchanged.
pub fn derive_sales_order_status(
    item_statuses: &[SalesOrderItemStatus],
) -> Option<SalesOrderStatus> {
    if item_statuses.is_empty() {
        return None;
    }

    let complete = item_statuses
        .iter()
        .filter(|s| **s == SalesOrderItemStatus::ShippedComplete)
        .count();
    let partial = item_statuses
        .iter()
        .filter(|s| **s == SalesOrderItemStatus::ShippedPartial)
        .count();

    if complete == item_statuses.len() {
        Some(SalesOrderStatus::ShippedComplete)
    } else if complete > 0 || partial > 0 {
        Some(SalesOrderStatus::ShippedPartial)
    } else {
        None
    }
}

/// Sales order lifecycle and outbound stock allocation.
#[derive(Clone)]
pub struct SalesOrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    numbering: DocumentNumberConfig,
}

impl SalesOrderService {
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

    /// Creates a draft order with its items; no ledger effect.
    #[instrument(skip(self, order, items))]
    pub async fn create_draft(
        &self,
        order: NewSalesOrder,
        items: Vec<NewSalesOrderItem>,
        actor_id: i64,
    ) -> Result<sales_order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let last_id = SalesOrderEntity::find()
            .order_by_desc(sales_order::Column::Id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .map_or(0, |so| so.id);
        let so_number = format_document_number(
            &self.numbering.sales_order,
            self.numbering.width,
            last_id + 1,
        );

        let created = sales_order::ActiveModel {
            so_number: Set(so_number),
            customer_name: Set(order.customer_name),
            warehouse_id: Set(order.warehouse_id),
            order_date: Set(order.order_date),
            status: Set(SalesOrderStatus::Draft.as_str().to_string()),
            notes: Set(order.notes),
            created_by: Set(actor_id),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        for item in items {
            sales_order_item::ActiveModel {
                sales_order_id: Set(created.id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                shipped_quantity: Set(Decimal::ZERO),
                unit_price: Set(item.unit_price),
                status: Set(SalesOrderItemStatus::Pending.as_str().to_string()),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(sales_order_id = created.id, so_number = %created.so_number, "sales order drafted");
        Ok(created)
    }

    /// Approves a draft or pending order. Allocation is a separate
    /// explicit action.
    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        sales_order_id: i64,
        actor_id: i64,
    ) -> Result<sales_order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = SalesOrderEntity::find_by_id(sales_order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Sales order {} not found", sales_order_id))
            })?;

        let status = order.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "sales order {} has unknown status '{}'",
                sales_order_id, order.status
            ))
        })?;

        if !status.is_approvable() {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "sales order {} cannot be approved from status '{}'",
                sales_order_id, status
            )));
        }

        let mut active: sales_order::ActiveModel = order.into();
        active.status = Set(SalesOrderStatus::Approved.as_str().to_string());
        active.approved_by = Set(Some(actor_id));
        active.approved_at = Set(Some(Utc::now()));
        let updated = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::SalesOrderApproved(sales_order_id))
                .await;
        }

        info!(sales_order_id, approved_by = actor_id, "sales order approved");
        Ok(updated)
    }

    /// Cancels a draft or pending order.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        sales_order_id: i64,
        actor_id: i64,
    ) -> Result<sales_order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = SalesOrderEntity::find_by_id(sales_order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Sales order {} not found", sales_order_id))
            })?;

        let status = order.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "sales order {} has unknown status '{}'",
                sales_order_id, order.status
            ))
        })?;

        if !status.is_approvable() {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "sales order {} cannot be cancelled from status '{}'",
                sales_order_id, status
            )));
        }

        let mut active: sales_order::ActiveModel = order.into();
        active.status = Set(SalesOrderStatus::Cancelled.as_str().to_string());
        let updated = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::SalesOrderCancelled(sales_order_id))
                .await;
        }

        info!(sales_order_id, "sales order cancelled");
        Ok(updated)
    }

    /// Allocates stock to an approved order's unshipped items.
    ///
    /// Each item draws from warehouses in ascending warehouse-id order
    /// until its remainder is covered or stock runs out. Returns
    /// `Ok(false)` when any item could not be fully covered; everything
    /// allocated up to that point stays committed. Forward progress is
    /// deliberately preferred over all-or-nothing here.
    #[instrument(skip(self))]
    pub async fn process_inventory(
        &self,
        sales_order_id: i64,
        actor_id: i64,
    ) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = SalesOrderEntity::find_by_id(sales_order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Sales order {} not found", sales_order_id))
            })?;

        let status = order.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "sales order {} has unknown status '{}'",
                sales_order_id, order.status
            ))
        })?;

        if !status.is_post_approval() {
            return Err(ServiceError::InvalidOperation(format!(
                "sales order {} is not approved (status '{}')",
                sales_order_id, status
            )));
        }

        let items = SalesOrderItemEntity::find()
            .filter(sales_order_item::Column::SalesOrderId.eq(sales_order_id))
            .order_by_asc(sales_order_item::Column::Id)
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut fully_allocated = true;
        let mut shortfalls: Vec<(i64, Decimal, Decimal)> = Vec::new();

        for item in items {
            let requested = item.remaining();
            if requested <= Decimal::ZERO {
                continue;
            }

            let mut remaining = requested;
            let mut shipped = item.shipped_quantity;

            // Fixed allocation order: ascending warehouse id, not FIFO by batch.
            let candidates = InventoryLevelEntity::find()
                .filter(inventory_level::Column::ProductId.eq(item.product_id))
                .filter(inventory_level::Column::QuantityAvailable.gt(Decimal::ZERO))
                .order_by_asc(inventory_level::Column::WarehouseId)
                .all(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;

            for level in candidates {
                if remaining <= Decimal::ZERO {
                    break;
                }

                let take = level.quantity_available.min(remaining);
                if take <= Decimal::ZERO {
                    continue;
                }

                if !deduct_from_level(&txn, level.id, take).await? {
                    warn!(
                        product_id = item.product_id,
                        warehouse_id = level.warehouse_id,
                        "stock changed concurrently during allocation; skipping warehouse"
                    );
                    continue;
                }

                record_transaction(
                    &txn,
                    NewTransaction {
                        product_id: item.product_id,
                        warehouse_id: level.warehouse_id,
                        transaction_type: TransactionType::Sales,
                        reference: TransactionReference::SalesOrder(sales_order_id),
                        quantity: -take,
                        batch_number: None,
                        expiry_date: None,
                        notes: Some(format!("Sales order: {}", order.so_number)),
                        created_by: actor_id,
                    },
                )
                .await?;

                shipped += take;
                remaining -= take;
            }

            let item_status = if shipped >= item.quantity {
                SalesOrderItemStatus::ShippedComplete
            } else if shipped > Decimal::ZERO {
                SalesOrderItemStatus::ShippedPartial
            } else {
                SalesOrderItemStatus::Pending
            };

            let product_id = item.product_id;
            let mut active: sales_order_item::ActiveModel = item.into();
            active.shipped_quantity = Set(shipped);
            active.status = Set(item_status.as_str().to_string());
            active
                .update(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;

            if remaining > Decimal::ZERO {
                fully_allocated = false;
                warn!(
                    sales_order_id,
                    product_id,
                    requested = %requested,
                    allocated = %(requested - remaining),
                    unallocated = %remaining,
                    "insufficient stock to fully allocate sales order item"
                );
                shortfalls.push((product_id, requested, requested - remaining));
            }
        }

        // Roll the order status up from the item multiset.
        let item_statuses: Vec<SalesOrderItemStatus> = SalesOrderItemEntity::find()
            .filter(sales_order_item::Column::SalesOrderId.eq(sales_order_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .iter()
            .filter_map(|i| i.status())
            .collect();

        if let Some(derived) = derive_sales_order_status(&item_statuses) {
            if Some(derived) != order.status() {
                let mut active: sales_order::ActiveModel = order.into();
                active.status = Set(derived.as_str().to_string());
                active
                    .update(&txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?;
            }
        }

        // Partial allocations commit; the return value carries the failure.
        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some(sender) = &self.event_sender {
            for (product_id, requested, allocated) in &shortfalls {
                sender
                    .send_or_log(Event::PartialAllocationWarning {
                        sales_order_id,
                        product_id: *product_id,
                        requested_quantity: *requested,
                        allocated_quantity: *allocated,
                    })
                    .await;
            }
            sender
                .send_or_log(Event::SalesOrderAllocated {
                    sales_order_id,
                    fully_allocated,
                })
                .await;
        }

        info!(sales_order_id, fully_allocated, "sales order allocation processed");
        Ok(fully_allocated)
    }
}
