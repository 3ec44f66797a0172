mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use stockflow_api::{
    entities::inventory_transaction::{
        self, Entity as InventoryTransaction, TransactionReference,
    },
    errors::ServiceError,
    services::inventory::{InventoryService, MovementMetadata},
};

use common::{create_employee, create_product, create_warehouse, seed_level, setup_db};

#[tokio::test]
async fn transfer_moves_stock_and_writes_paired_transactions() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Alice").await;
    let product = create_product(&db, "WIDGET-001", "Widget").await;
    let w1 = create_warehouse(&db, "W1", "Main Warehouse").await;
    let w2 = create_warehouse(&db, "W2", "Overflow Warehouse").await;
    seed_level(&db, product.id, w1.id, dec!(100)).await;

    let service = InventoryService::new(db.clone(), None);

    service
        .transfer_stock(
            product.id,
            w1.id,
            w2.id,
            dec!(30),
            MovementMetadata::default(),
            TransactionReference::Manual,
            actor.id,
        )
        .await
        .expect("transfer should succeed");

    let source = service
        .get_level(product.id, w1.id)
        .await
        .unwrap()
        .expect("source level exists");
    let destination = service
        .get_level(product.id, w2.id)
        .await
        .unwrap()
        .expect("destination level created");

    assert_eq!(source.quantity_available, dec!(70));
    assert_eq!(destination.quantity_available, dec!(30));
    // Conservation: total across both warehouses is unchanged.
    assert_eq!(
        source.quantity_available + destination.quantity_available,
        dec!(100)
    );

    let out = InventoryTransaction::find()
        .filter(inventory_transaction::Column::WarehouseId.eq(w1.id))
        .all(&*db)
        .await
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].transaction_type, "transfer_out");
    assert_eq!(out[0].quantity, dec!(-30));
    assert_eq!(out[0].created_by, actor.id);
    assert_eq!(
        out[0].notes.as_deref(),
        Some("Transfer to Overflow Warehouse")
    );

    let inbound = InventoryTransaction::find()
        .filter(inventory_transaction::Column::WarehouseId.eq(w2.id))
        .all(&*db)
        .await
        .unwrap();
    assert_eq!(inbound.len(), 1);
    assert_eq!(inbound[0].transaction_type, "transfer_in");
    assert_eq!(inbound[0].quantity, dec!(30));
    assert_eq!(
        inbound[0].notes.as_deref(),
        Some("Transfer from Main Warehouse")
    );

    // Destination log agrees with its ledger row.
    assert_eq!(
        service.transaction_sum(product.id, w2.id).await.unwrap(),
        dec!(30)
    );
}

#[tokio::test]
async fn transfer_rejects_non_positive_quantity_without_mutating() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Alice").await;
    let product = create_product(&db, "WIDGET-001", "Widget").await;
    let w1 = create_warehouse(&db, "W1", "Main").await;
    let w2 = create_warehouse(&db, "W2", "Overflow").await;
    seed_level(&db, product.id, w1.id, dec!(50)).await;

    let service = InventoryService::new(db.clone(), None);

    for quantity in [dec!(0), dec!(-5)] {
        let result = service
            .transfer_stock(
                product.id,
                w1.id,
                w2.id,
                quantity,
                MovementMetadata::default(),
                TransactionReference::Manual,
                actor.id,
            )
            .await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));
    }

    let level = service.get_level(product.id, w1.id).await.unwrap().unwrap();
    assert_eq!(level.quantity_available, dec!(50));
    assert!(service.get_level(product.id, w2.id).await.unwrap().is_none());

    let transactions = InventoryTransaction::find().all(&*db).await.unwrap();
    assert!(transactions.is_empty());
}

#[tokio::test]
async fn transfer_insufficient_stock_leaves_both_warehouses_unchanged() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Alice").await;
    let product = create_product(&db, "WIDGET-001", "Widget").await;
    let w1 = create_warehouse(&db, "W1", "Main").await;
    let w2 = create_warehouse(&db, "W2", "Overflow").await;
    seed_level(&db, product.id, w1.id, dec!(10)).await;

    let service = InventoryService::new(db.clone(), None);

    let result = service
        .transfer_stock(
            product.id,
            w1.id,
            w2.id,
            dec!(11),
            MovementMetadata::default(),
            TransactionReference::Manual,
            actor.id,
        )
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    let level = service.get_level(product.id, w1.id).await.unwrap().unwrap();
    assert_eq!(level.quantity_available, dec!(10));
    assert!(service.get_level(product.id, w2.id).await.unwrap().is_none());
    assert!(InventoryTransaction::find()
        .all(&*db)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn transfer_from_warehouse_without_stock_row_fails() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Alice").await;
    let product = create_product(&db, "WIDGET-001", "Widget").await;
    let w1 = create_warehouse(&db, "W1", "Main").await;
    let w2 = create_warehouse(&db, "W2", "Overflow").await;

    let service = InventoryService::new(db.clone(), None);

    let result = service
        .transfer_stock(
            product.id,
            w1.id,
            w2.id,
            dec!(1),
            MovementMetadata::default(),
            TransactionReference::Manual,
            actor.id,
        )
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn transfer_to_same_warehouse_is_rejected() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Alice").await;
    let product = create_product(&db, "WIDGET-001", "Widget").await;
    let w1 = create_warehouse(&db, "W1", "Main").await;
    seed_level(&db, product.id, w1.id, dec!(10)).await;

    let service = InventoryService::new(db.clone(), None);

    let result = service
        .transfer_stock(
            product.id,
            w1.id,
            w1.id,
            dec!(5),
            MovementMetadata::default(),
            TransactionReference::Manual,
            actor.id,
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let level = service.get_level(product.id, w1.id).await.unwrap().unwrap();
    assert_eq!(level.quantity_available, dec!(10));
}

#[tokio::test]
async fn transfer_carries_batch_metadata_into_both_transactions() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Alice").await;
    let product = create_product(&db, "WIDGET-001", "Widget").await;
    let w1 = create_warehouse(&db, "W1", "Main").await;
    let w2 = create_warehouse(&db, "W2", "Overflow").await;
    seed_level(&db, product.id, w1.id, dec!(40)).await;

    let service = InventoryService::new(db.clone(), None);

    service
        .transfer_stock(
            product.id,
            w1.id,
            w2.id,
            dec!(15),
            MovementMetadata {
                batch_number: Some("BATCH-7".to_string()),
                expiry_date: None,
            },
            TransactionReference::Manual,
            actor.id,
        )
        .await
        .expect("transfer should succeed");

    let transactions = InventoryTransaction::find().all(&*db).await.unwrap();
    assert_eq!(transactions.len(), 2);
    for t in transactions {
        assert_eq!(t.batch_number.as_deref(), Some("BATCH-7"));
    }
}
