use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of stock movements recorded in the transaction log.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    StockIn,
    StockOut,
    AdjustmentAdd,
    AdjustmentRemove,
    TransferIn,
    TransferOut,
    Sales,
    Purchase,
    ReturnIn,
    ReturnOut,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Provenance of a transaction: which document caused the movement.
///
/// Stored as the (reference_type, reference_id) column pair; the sum type
/// gives exhaustive matching wherever provenance is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionReference {
    PurchaseOrder(i64),
    SalesOrder(i64),
    StockAdjustment(i64),
    StockTransfer(i64),
    Manual,
}

impl TransactionReference {
    pub fn as_parts(&self) -> (Option<&'static str>, Option<i64>) {
        match *self {
            TransactionReference::PurchaseOrder(id) => (Some("purchase_order"), Some(id)),
            TransactionReference::SalesOrder(id) => (Some("sales_order"), Some(id)),
            TransactionReference::StockAdjustment(id) => (Some("stock_adjustment"), Some(id)),
            TransactionReference::StockTransfer(id) => (Some("stock_transfer"), Some(id)),
            TransactionReference::Manual => (None, None),
        }
    }

    /// Rebuilds the reference from stored columns. Returns `None` for an
    /// unknown type string or a typed reference missing its id.
    pub fn from_parts(reference_type: Option<&str>, reference_id: Option<i64>) -> Option<Self> {
        match (reference_type, reference_id) {
            (None, _) => Some(TransactionReference::Manual),
            (Some("purchase_order"), Some(id)) => Some(TransactionReference::PurchaseOrder(id)),
            (Some("sales_order"), Some(id)) => Some(TransactionReference::SalesOrder(id)),
            (Some("stock_adjustment"), Some(id)) => Some(TransactionReference::StockAdjustment(id)),
            (Some("stock_transfer"), Some(id)) => Some(TransactionReference::StockTransfer(id)),
            _ => None,
        }
    }
}

/// Append-only audit record of a single stock mutation.
///
/// Rows are inserted by the movement services and never updated or
/// deleted. Quantity is signed: positive increases stock, negative
/// decreases it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: i64,
    pub warehouse_id: i64,
    pub transaction_type: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<i64>,
    pub quantity: Decimal,
    pub batch_number: Option<String>,
    pub expiry_date: Option<Date>,
    pub notes: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn transaction_type(&self) -> Option<TransactionType> {
        self.transaction_type.parse().ok()
    }

    pub fn reference(&self) -> Option<TransactionReference> {
        TransactionReference::from_parts(self.reference_type.as_deref(), self.reference_id)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::warehouse::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouse::Column::Id"
    )]
    Warehouse,
    #[sea_orm(
        belongs_to = "super::employee::Entity",
        from = "Column::CreatedBy",
        to = "super::employee::Column::Id"
    )]
    Creator,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::warehouse::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Warehouse.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active = self;
        if insert {
            if let ActiveValue::NotSet = active.id {
                active.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active.created_at {
                active.created_at = Set(Utc::now());
            }
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_type_round_trips_through_strings() {
        for ty in [
            TransactionType::StockIn,
            TransactionType::StockOut,
            TransactionType::AdjustmentAdd,
            TransactionType::AdjustmentRemove,
            TransactionType::TransferIn,
            TransactionType::TransferOut,
            TransactionType::Sales,
            TransactionType::Purchase,
            TransactionType::ReturnIn,
            TransactionType::ReturnOut,
        ] {
            let parsed: TransactionType = ty.as_str().parse().expect("known type string");
            assert_eq!(parsed, ty);
        }
        assert_eq!(TransactionType::AdjustmentAdd.as_str(), "adjustment_add");
        assert!("restock".parse::<TransactionType>().is_err());
    }

    #[test]
    fn reference_round_trips_through_columns() {
        for reference in [
            TransactionReference::PurchaseOrder(1),
            TransactionReference::SalesOrder(2),
            TransactionReference::StockAdjustment(3),
            TransactionReference::StockTransfer(4),
            TransactionReference::Manual,
        ] {
            let (ty, id) = reference.as_parts();
            assert_eq!(TransactionReference::from_parts(ty, id), Some(reference));
        }
    }

    #[test]
    fn reference_rejects_unknown_or_incomplete_parts() {
        assert_eq!(TransactionReference::from_parts(Some("work_order"), Some(9)), None);
        assert_eq!(TransactionReference::from_parts(Some("sales_order"), None), None);
    }
}
