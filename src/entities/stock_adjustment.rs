use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

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
pub enum StockAdjustmentStatus {
    Draft,
    Pending,
    Approved,
    Cancelled,
}

impl StockAdjustmentStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn is_approvable(&self) -> bool {
        matches!(
            self,
            StockAdjustmentStatus::Draft | StockAdjustmentStatus::Pending
        )
    }
}

/// Why stock is being corrected outside the normal order flows.
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
pub enum AdjustmentReason {
    PhysicalCount,
    Damage,
    Expiry,
    Theft,
    Return,
    SupplierReturn,
    Other,
}

impl AdjustmentReason {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_adjustments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub adjustment_number: String,
    pub warehouse_id: i64,
    pub adjustment_date: Option<Date>,
    pub reason: String,
    pub notes: Option<String>,
    pub status: String,
    pub created_by: i64,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status(&self) -> Option<StockAdjustmentStatus> {
        self.status.parse().ok()
    }

    pub fn reason(&self) -> Option<AdjustmentReason> {
        self.reason.parse().ok()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_adjustment_item::Entity")]
    Items,
    #[sea_orm(
        belongs_to = "super::warehouse::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouse::Column::Id"
    )]
    Warehouse,
}

impl Related<super::stock_adjustment_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active = self;
        let now = Utc::now();
        if insert {
            if let ActiveValue::NotSet = active.created_at {
                active.created_at = Set(now);
            }
        }
        active.updated_at = Set(now);
        Ok(active)
    }
}
