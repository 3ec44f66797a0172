use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Current stock level for one (product, warehouse) pair.
///
/// One row per pair, enforced by a unique index. Mutated exclusively by
/// the movement services; the transaction log records every change.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub product_id: i64,
    pub warehouse_id: i64,
    pub quantity_available: Decimal,
    pub quantity_reserved: Decimal,
    pub minimum_stock: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
    pub bin_location: Option<String>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<Date>,
    pub last_counted_date: Option<Date>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// On-hand quantity net of reservations.
    pub fn quantity_on_hand(&self) -> Decimal {
        self.quantity_available - self.quantity_reserved
    }

    pub fn needs_reorder(&self) -> bool {
        match self.reorder_point {
            Some(point) => self.quantity_available <= point,
            None => false,
        }
    }

    pub fn is_low_stock(&self) -> bool {
        match self.minimum_stock {
            Some(minimum) => self.quantity_available <= minimum,
            None => false,
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(available: Decimal, reserved: Decimal) -> Model {
        Model {
            id: 1,
            product_id: 1,
            warehouse_id: 1,
            quantity_available: available,
            quantity_reserved: reserved,
            minimum_stock: Some(dec!(10)),
            reorder_point: Some(dec!(25)),
            bin_location: None,
            batch_number: None,
            expiry_date: None,
            last_counted_date: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn on_hand_subtracts_reservations() {
        assert_eq!(level(dec!(100), dec!(30)).quantity_on_hand(), dec!(70));
    }

    #[test]
    fn reorder_and_low_stock_thresholds() {
        let l = level(dec!(25), dec!(0));
        assert!(l.needs_reorder());
        assert!(!l.is_low_stock());

        let l = level(dec!(10), dec!(0));
        assert!(l.is_low_stock());
    }

    #[test]
    fn missing_thresholds_never_flag() {
        let mut l = level(dec!(0), dec!(0));
        l.minimum_stock = None;
        l.reorder_point = None;
        assert!(!l.needs_reorder());
        assert!(!l.is_low_stock());
    }
}
