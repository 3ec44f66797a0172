use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::{
    entities::{
        inventory_level::{self, Entity as InventoryLevelEntity},
        inventory_transaction::{
            self, Entity as InventoryTransactionEntity, TransactionReference, TransactionType,
        },
        warehouse::Entity as WarehouseEntity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Optional batch/expiry metadata carried on a stock movement.
#[derive(Debug, Clone, Default)]
pub struct MovementMetadata {
    pub batch_number: Option<String>,
    pub expiry_date: Option<chrono::NaiveDate>,
}

/// One append to the transaction log.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub product_id: i64,
    pub warehouse_id: i64,
    pub transaction_type: TransactionType,
    pub reference: TransactionReference,
    /// Signed: positive increases stock, negative decreases it
    pub quantity: Decimal,
    pub batch_number: Option<String>,
    pub expiry_date: Option<chrono::NaiveDate>,
    pub notes: Option<String>,
    pub created_by: i64,
}

/// Looks up the ledger row for a (product, warehouse) pair.
pub(crate) async fn find_level<C>(
    conn: &C,
    product_id: i64,
    warehouse_id: i64,
) -> Result<Option<inventory_level::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    InventoryLevelEntity::find()
        .filter(inventory_level::Column::ProductId.eq(product_id))
        .filter(inventory_level::Column::WarehouseId.eq(warehouse_id))
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Adds to a ledger row, creating it when absent.
///
/// The increment runs as a single `UPDATE .. SET quantity_available =
/// quantity_available + ?` so concurrent movements against the same row
/// serialize in the database instead of clobbering each other.
pub(crate) async fn add_to_level<C>(
    conn: &C,
    product_id: i64,
    warehouse_id: i64,
    quantity: Decimal,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    match find_level(conn, product_id, warehouse_id).await? {
        Some(level) => {
            InventoryLevelEntity::update_many()
                .col_expr(
                    inventory_level::Column::QuantityAvailable,
                    Expr::col(inventory_level::Column::QuantityAvailable).add(quantity),
                )
                .col_expr(
                    inventory_level::Column::UpdatedAt,
                    Expr::value(Utc::now()),
                )
                .filter(inventory_level::Column::Id.eq(level.id))
                .exec(conn)
                .await
                .map_err(ServiceError::DatabaseError)?;
        }
        None => {
            let level = inventory_level::ActiveModel {
                product_id: Set(product_id),
                warehouse_id: Set(warehouse_id),
                quantity_available: Set(quantity),
                quantity_reserved: Set(Decimal::ZERO),
                ..Default::default()
            };
            level
                .insert(conn)
                .await
                .map_err(ServiceError::DatabaseError)?;
        }
    }
    Ok(())
}

/// Deducts from a ledger row, guarded so the row can never go negative.
///
/// Returns `false` when the guard rejected the update, i.e. available
/// stock changed under us since it was read.
pub(crate) async fn deduct_from_level<C>(
    conn: &C,
    level_id: i64,
    quantity: Decimal,
) -> Result<bool, ServiceError>
where
    C: ConnectionTrait,
{
    let result = InventoryLevelEntity::update_many()
        .col_expr(
            inventory_level::Column::QuantityAvailable,
            Expr::col(inventory_level::Column::QuantityAvailable).sub(quantity),
        )
        .col_expr(
            inventory_level::Column::UpdatedAt,
            Expr::value(Utc::now()),
        )
        .filter(inventory_level::Column::Id.eq(level_id))
        .filter(inventory_level::Column::QuantityAvailable.gte(quantity))
        .exec(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    Ok(result.rows_affected == 1)
}

/// Appends one record to the transaction log.
pub(crate) async fn record_transaction<C>(
    conn: &C,
    transaction: NewTransaction,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let (reference_type, reference_id) = transaction.reference.as_parts();

    let record = inventory_transaction::ActiveModel {
        product_id: Set(transaction.product_id),
        warehouse_id: Set(transaction.warehouse_id),
        transaction_type: Set(transaction.transaction_type.as_str().to_string()),
        reference_type: Set(reference_type.map(str::to_string)),
        reference_id: Set(reference_id),
        quantity: Set(transaction.quantity),
        batch_number: Set(transaction.batch_number),
        expiry_date: Set(transaction.expiry_date),
        notes: Set(transaction.notes),
        created_by: Set(transaction.created_by),
        ..Default::default()
    };

    record
        .insert(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    Ok(())
}

/// Service over the inventory ledger and its transaction log.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Current ledger row for a product at a warehouse.
    #[instrument(skip(self))]
    pub async fn get_level(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<Option<inventory_level::Model>, ServiceError> {
        find_level(&*self.db, product_id, warehouse_id).await
    }

    /// All ledger rows for a product, ordered by warehouse id.
    #[instrument(skip(self))]
    pub async fn list_levels(
        &self,
        product_id: i64,
    ) -> Result<Vec<inventory_level::Model>, ServiceError> {
        InventoryLevelEntity::find()
            .filter(inventory_level::Column::ProductId.eq(product_id))
            .order_by_asc(inventory_level::Column::WarehouseId)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Total available quantity for a product across all warehouses.
    #[instrument(skip(self))]
    pub async fn total_available(&self, product_id: i64) -> Result<Decimal, ServiceError> {
        let levels = self.list_levels(product_id).await?;
        Ok(levels.iter().map(|l| l.quantity_available).sum())
    }

    /// Whether at least `required` units are available at a warehouse.
    #[instrument(skip(self))]
    pub async fn check_availability(
        &self,
        product_id: i64,
        warehouse_id: i64,
        required: Decimal,
    ) -> Result<bool, ServiceError> {
        let level = self.get_level(product_id, warehouse_id).await?;
        Ok(level.map_or(false, |l| l.quantity_available >= required))
    }

    /// Signed sum of the transaction log for a (product, warehouse) pair.
    ///
    /// The ledger row is the source of truth; this exists so callers can
    /// audit it against the log and detect drift.
    #[instrument(skip(self))]
    pub async fn transaction_sum(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<Decimal, ServiceError> {
        let transactions = InventoryTransactionEntity::find()
            .filter(inventory_transaction::Column::ProductId.eq(product_id))
            .filter(inventory_transaction::Column::WarehouseId.eq(warehouse_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(transactions.iter().map(|t| t.quantity).sum())
    }

    /// Moves stock between two warehouses.
    ///
    /// All four writes (two level updates, two log appends) happen in one
    /// database transaction; any failure rolls back all of them. The
    /// source must already hold the full requested quantity.
    #[instrument(skip(self), fields(product_id, source_warehouse_id, destination_warehouse_id))]
    pub async fn transfer_stock(
        &self,
        product_id: i64,
        source_warehouse_id: i64,
        destination_warehouse_id: i64,
        quantity: Decimal,
        metadata: MovementMetadata,
        reference: TransactionReference,
        actor_id: i64,
    ) -> Result<(), ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "transfer quantity must be positive, got {}",
                quantity
            )));
        }
        if source_warehouse_id == destination_warehouse_id {
            return Err(ServiceError::ValidationError(
                "source and destination warehouse must differ".to_string(),
            ));
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let source = WarehouseEntity::find_by_id(source_warehouse_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Warehouse {} not found", source_warehouse_id))
            })?;
        let destination = WarehouseEntity::find_by_id(destination_warehouse_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Warehouse {} not found",
                    destination_warehouse_id
                ))
            })?;

        let source_level = find_level(&txn, product_id, source_warehouse_id)
            .await?
            .ok_or_else(|| {
                ServiceError::InsufficientStock(format!(
                    "product {} has no stock at warehouse {}, requested {}",
                    product_id, source_warehouse_id, quantity
                ))
            })?;

        if source_level.quantity_available < quantity {
            error!(
                product_id,
                source_warehouse_id,
                available = %source_level.quantity_available,
                requested = %quantity,
                "insufficient stock in source warehouse"
            );
            return Err(ServiceError::InsufficientStock(format!(
                "product {} at warehouse {}: available {}, requested {}",
                product_id, source_warehouse_id, source_level.quantity_available, quantity
            )));
        }

        if !deduct_from_level(&txn, source_level.id, quantity).await? {
            return Err(ServiceError::InsufficientStock(format!(
                "product {} at warehouse {}: stock changed concurrently, requested {}",
                product_id, source_warehouse_id, quantity
            )));
        }

        record_transaction(
            &txn,
            NewTransaction {
                product_id,
                warehouse_id: source_warehouse_id,
                transaction_type: TransactionType::TransferOut,
                reference,
                quantity: -quantity,
                batch_number: metadata.batch_number.clone(),
                expiry_date: metadata.expiry_date,
                notes: Some(format!("Transfer to {}", destination.name)),
                created_by: actor_id,
            },
        )
        .await?;

        add_to_level(&txn, product_id, destination_warehouse_id, quantity).await?;

        record_transaction(
            &txn,
            NewTransaction {
                product_id,
                warehouse_id: destination_warehouse_id,
                transaction_type: TransactionType::TransferIn,
                reference,
                quantity,
                batch_number: metadata.batch_number,
                expiry_date: metadata.expiry_date,
                notes: Some(format!("Transfer from {}", source.name)),
                created_by: actor_id,
            },
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockTransferred {
                    product_id,
                    source_warehouse_id,
                    destination_warehouse_id,
                    quantity,
                })
                .await;
        }

        info!(
            product_id,
            source_warehouse_id,
            destination_warehouse_id,
            quantity = %quantity,
            "stock transferred"
        );

        Ok(())
    }
}
