mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, QueryOrder};

use stockflow_api::{
    entities::inventory_transaction::{self, Entity as InventoryTransaction},
    errors::ServiceError,
    services::{
        inventory::InventoryService,
        stock_adjustments::{
            NewStockAdjustment, NewStockAdjustmentItem, StockAdjustmentService,
        },
    },
};
use stockflow_api::entities::stock_adjustment::AdjustmentReason;

use common::{
    create_employee, create_product, create_stock_adjustment, create_stock_adjustment_item,
    create_warehouse, seed_level, setup_db,
};

fn adjustment_item(
    product_id: i64,
    current: rust_decimal::Decimal,
    new: rust_decimal::Decimal,
) -> NewStockAdjustmentItem {
    NewStockAdjustmentItem {
        product_id,
        current_quantity: current,
        new_quantity: new,
        batch_number: None,
        expiry_date: None,
        notes: None,
    }
}

#[tokio::test]
async fn approval_logs_one_signed_transaction_per_item() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Dave").await;
    let gained = create_product(&db, "NUT-001", "Nut").await;
    let lost = create_product(&db, "BOLT-001", "Bolt").await;
    let warehouse = create_warehouse(&db, "W1", "Main").await;

    let service = StockAdjustmentService::new(db.clone(), None);

    let adjustment = service
        .create_draft(
            NewStockAdjustment {
                warehouse_id: warehouse.id,
                adjustment_date: None,
                reason: AdjustmentReason::PhysicalCount,
                notes: None,
            },
            vec![
                adjustment_item(gained.id, dec!(100), dec!(120)),
                adjustment_item(lost.id, dec!(50), dec!(30)),
            ],
            actor.id,
        )
        .await
        .expect("draft should be created");

    // Draft save must not have touched the transaction log.
    assert!(InventoryTransaction::find()
        .all(&*db)
        .await
        .unwrap()
        .is_empty());

    service
        .approve(adjustment.id, actor.id)
        .await
        .expect("approval should succeed");

    let transactions = InventoryTransaction::find()
        .order_by_asc(inventory_transaction::Column::Quantity)
        .all(&*db)
        .await
        .unwrap();
    assert_eq!(transactions.len(), 2);

    let removal = &transactions[0];
    assert_eq!(removal.transaction_type, "adjustment_remove");
    assert_eq!(removal.quantity, dec!(-20));
    assert_eq!(removal.product_id, lost.id);

    let addition = &transactions[1];
    assert_eq!(addition.transaction_type, "adjustment_add");
    assert_eq!(addition.quantity, dec!(20));
    assert_eq!(addition.product_id, gained.id);

    for t in &transactions {
        assert_eq!(t.warehouse_id, warehouse.id);
        assert_eq!(t.reference_type.as_deref(), Some("stock_adjustment"));
        assert_eq!(t.reference_id, Some(adjustment.id));
        let notes = t.notes.as_deref().unwrap();
        assert!(notes.contains(&adjustment.adjustment_number));
        assert!(notes.contains("physical_count"));
    }
}

#[tokio::test]
async fn adjustment_logs_transactions_without_reconciling_level() {
    // The adjustment service only writes the audit log; the ledger row is
    // expected to be corrected through direct inventory edits. This
    // asymmetry with receipts/sales/transfers is intentional and the
    // known source of ledger-vs-log drift.
    let db = setup_db().await;
    let actor = create_employee(&db, "Dave").await;
    let product = create_product(&db, "NUT-001", "Nut").await;
    let warehouse = create_warehouse(&db, "W1", "Main").await;
    seed_level(&db, product.id, warehouse.id, dec!(100)).await;

    let service = StockAdjustmentService::new(db.clone(), None);
    let inventory = InventoryService::new(db.clone(), None);

    let adjustment = service
        .create_draft(
            NewStockAdjustment {
                warehouse_id: warehouse.id,
                adjustment_date: None,
                reason: AdjustmentReason::Damage,
                notes: None,
            },
            vec![adjustment_item(product.id, dec!(100), dec!(70))],
            actor.id,
        )
        .await
        .unwrap();

    service.approve(adjustment.id, actor.id).await.unwrap();

    // The level row still says 100: only the log carries the -30.
    let level = inventory
        .get_level(product.id, warehouse.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(level.quantity_available, dec!(100));
    assert_eq!(
        inventory
            .transaction_sum(product.id, warehouse.id)
            .await
            .unwrap(),
        dec!(-30)
    );
}

#[tokio::test]
async fn delta_is_frozen_at_save_time_not_approval_time() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Dave").await;
    let product = create_product(&db, "NUT-001", "Nut").await;
    let warehouse = create_warehouse(&db, "W1", "Main").await;
    seed_level(&db, product.id, warehouse.id, dec!(100)).await;

    let service = StockAdjustmentService::new(db.clone(), None);

    // Counted 100 -> 80, so the frozen delta is -20.
    let adjustment = service
        .create_draft(
            NewStockAdjustment {
                warehouse_id: warehouse.id,
                adjustment_date: None,
                reason: AdjustmentReason::PhysicalCount,
                notes: None,
            },
            vec![adjustment_item(product.id, dec!(100), dec!(80))],
            actor.id,
        )
        .await
        .unwrap();

    // A sale happens between count and approval; the delta is now stale
    // but is applied as frozen.
    use sea_orm::{ActiveModelTrait, ActiveValue::Set};
    use stockflow_api::entities::inventory_level;
    let level = InventoryService::new(db.clone(), None)
        .get_level(product.id, warehouse.id)
        .await
        .unwrap()
        .unwrap();
    let mut active: inventory_level::ActiveModel = level.into();
    active.quantity_available = Set(dec!(60));
    active.update(&*db).await.unwrap();

    service.approve(adjustment.id, actor.id).await.unwrap();

    let transactions = InventoryTransaction::find().all(&*db).await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].quantity, dec!(-20));
}

#[tokio::test]
async fn approve_requires_draft_or_pending() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Dave").await;
    let product = create_product(&db, "NUT-001", "Nut").await;
    let warehouse = create_warehouse(&db, "W1", "Main").await;

    let adjustment =
        create_stock_adjustment(&db, "ADJ000001", warehouse.id, "pending", actor.id).await;
    create_stock_adjustment_item(&db, adjustment.id, product.id, dec!(10), dec!(12)).await;

    let service = StockAdjustmentService::new(db.clone(), None);

    service.approve(adjustment.id, actor.id).await.unwrap();

    // Second approval would double-log the delta; it must be refused.
    let result = service.approve(adjustment.id, actor.id).await;
    assert_matches!(result, Err(ServiceError::InvalidStatusTransition(_)));

    let transactions = InventoryTransaction::find().all(&*db).await.unwrap();
    assert_eq!(transactions.len(), 1);
}

#[tokio::test]
async fn cancelled_adjustment_cannot_be_approved() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Dave").await;
    let warehouse = create_warehouse(&db, "W1", "Main").await;

    let adjustment =
        create_stock_adjustment(&db, "ADJ000001", warehouse.id, "draft", actor.id).await;

    let service = StockAdjustmentService::new(db.clone(), None);

    service.cancel(adjustment.id, actor.id).await.unwrap();

    let result = service.approve(adjustment.id, actor.id).await;
    assert_matches!(result, Err(ServiceError::InvalidStatusTransition(_)));
}
