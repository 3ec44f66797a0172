mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use stockflow_api::{
    entities::{
        inventory_transaction::{self, Entity as InventoryTransaction},
        sales_order::Entity as SalesOrder,
        sales_order_item::Entity as SalesOrderItem,
    },
    errors::ServiceError,
    services::{inventory::InventoryService, sales_orders::SalesOrderService},
};

use common::{
    create_employee, create_product, create_sales_order, create_sales_order_item,
    create_warehouse, seed_level, setup_db,
};

#[tokio::test]
async fn shortfall_allocation_commits_partial_and_reports_failure() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Carol").await;
    let product = create_product(&db, "CASE-001", "Case").await;
    let w1 = create_warehouse(&db, "W1", "Main").await;
    let w2 = create_warehouse(&db, "W2", "Overflow").await;
    seed_level(&db, product.id, w1.id, dec!(6)).await;
    seed_level(&db, product.id, w2.id, dec!(3)).await;

    let so = create_sales_order(&db, "SO000001", "approved", actor.id).await;
    let item = create_sales_order_item(&db, so.id, product.id, dec!(10)).await;

    let service = SalesOrderService::new(db.clone(), None);
    let inventory = InventoryService::new(db.clone(), None);

    let fully_allocated = service
        .process_inventory(so.id, actor.id)
        .await
        .expect("allocation call itself should not error");
    // 9 of 10 allocated: the call reports failure...
    assert!(!fully_allocated);

    // ...but both decrements stay committed.
    let level1 = inventory.get_level(product.id, w1.id).await.unwrap().unwrap();
    let level2 = inventory.get_level(product.id, w2.id).await.unwrap().unwrap();
    assert_eq!(level1.quantity_available, dec!(0));
    assert_eq!(level2.quantity_available, dec!(0));

    let after = SalesOrderItem::find_by_id(item.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.shipped_quantity, dec!(9));
    assert_eq!(after.status, "shipped_partial");

    let transactions = InventoryTransaction::find()
        .filter(inventory_transaction::Column::TransactionType.eq("sales"))
        .order_by_asc(inventory_transaction::Column::WarehouseId)
        .all(&*db)
        .await
        .unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0].warehouse_id, w1.id);
    assert_eq!(transactions[0].quantity, dec!(-6));
    assert_eq!(transactions[1].warehouse_id, w2.id);
    assert_eq!(transactions[1].quantity, dec!(-3));

    // Shipped increase equals total inventory decrease for the call.
    let total_decrease: rust_decimal::Decimal =
        transactions.iter().map(|t| -t.quantity).sum();
    assert_eq!(total_decrease, after.shipped_quantity);

    let order = SalesOrder::find_by_id(so.id).one(&*db).await.unwrap().unwrap();
    assert_eq!(order.status, "shipped_partial");
}

#[tokio::test]
async fn allocation_draws_from_warehouses_in_ascending_id_order() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Carol").await;
    let product = create_product(&db, "CASE-001", "Case").await;
    let w1 = create_warehouse(&db, "W1", "Main").await;
    let w2 = create_warehouse(&db, "W2", "Overflow").await;
    seed_level(&db, product.id, w1.id, dec!(4)).await;
    seed_level(&db, product.id, w2.id, dec!(10)).await;

    let so = create_sales_order(&db, "SO000001", "approved", actor.id).await;
    create_sales_order_item(&db, so.id, product.id, dec!(6)).await;

    let service = SalesOrderService::new(db.clone(), None);
    let inventory = InventoryService::new(db.clone(), None);

    let fully_allocated = service.process_inventory(so.id, actor.id).await.unwrap();
    assert!(fully_allocated);

    // W1 is drained first, W2 covers the rest.
    let level1 = inventory.get_level(product.id, w1.id).await.unwrap().unwrap();
    let level2 = inventory.get_level(product.id, w2.id).await.unwrap().unwrap();
    assert_eq!(level1.quantity_available, dec!(0));
    assert_eq!(level2.quantity_available, dec!(8));
}

#[tokio::test]
async fn full_allocation_completes_item_and_order() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Carol").await;
    let product = create_product(&db, "CASE-001", "Case").await;
    let w1 = create_warehouse(&db, "W1", "Main").await;
    seed_level(&db, product.id, w1.id, dec!(10)).await;

    let so = create_sales_order(&db, "SO000001", "approved", actor.id).await;
    let item = create_sales_order_item(&db, so.id, product.id, dec!(5)).await;

    let service = SalesOrderService::new(db.clone(), None);

    let fully_allocated = service.process_inventory(so.id, actor.id).await.unwrap();
    assert!(fully_allocated);

    let after = SalesOrderItem::find_by_id(item.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.shipped_quantity, dec!(5));
    assert_eq!(after.status, "shipped_complete");

    let order = SalesOrder::find_by_id(so.id).one(&*db).await.unwrap().unwrap();
    assert_eq!(order.status, "shipped_complete");
}

#[tokio::test]
async fn allocation_requires_an_approved_order() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Carol").await;
    let product = create_product(&db, "CASE-001", "Case").await;
    let w1 = create_warehouse(&db, "W1", "Main").await;
    seed_level(&db, product.id, w1.id, dec!(10)).await;

    let so = create_sales_order(&db, "SO000001", "draft", actor.id).await;
    create_sales_order_item(&db, so.id, product.id, dec!(5)).await;

    let service = SalesOrderService::new(db.clone(), None);
    let inventory = InventoryService::new(db.clone(), None);

    let result = service.process_inventory(so.id, actor.id).await;
    assert_matches!(result, Err(ServiceError::InvalidOperation(_)));

    let level = inventory.get_level(product.id, w1.id).await.unwrap().unwrap();
    assert_eq!(level.quantity_available, dec!(10));
    assert!(InventoryTransaction::find()
        .all(&*db)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn already_shipped_items_are_not_reallocated() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Carol").await;
    let product = create_product(&db, "CASE-001", "Case").await;
    let w1 = create_warehouse(&db, "W1", "Main").await;
    seed_level(&db, product.id, w1.id, dec!(10)).await;

    let so = create_sales_order(&db, "SO000001", "approved", actor.id).await;
    create_sales_order_item(&db, so.id, product.id, dec!(4)).await;

    let service = SalesOrderService::new(db.clone(), None);
    let inventory = InventoryService::new(db.clone(), None);

    assert!(service.process_inventory(so.id, actor.id).await.unwrap());
    // Second call finds nothing left to ship and must not touch stock.
    assert!(service.process_inventory(so.id, actor.id).await.unwrap());

    let level = inventory.get_level(product.id, w1.id).await.unwrap().unwrap();
    assert_eq!(level.quantity_available, dec!(6));

    let sales_transactions = InventoryTransaction::find()
        .filter(inventory_transaction::Column::TransactionType.eq("sales"))
        .all(&*db)
        .await
        .unwrap();
    assert_eq!(sales_transactions.len(), 1);
}

#[tokio::test]
async fn item_with_no_stock_anywhere_stays_pending() {
    let db = setup_db().await;
    let actor = create_employee(&db, "Carol").await;
    let product = create_product(&db, "CASE-001", "Case").await;
    create_warehouse(&db, "W1", "Main").await;

    let so = create_sales_order(&db, "SO000001", "approved", actor.id).await;
    let item = create_sales_order_item(&db, so.id, product.id, dec!(5)).await;

    let service = SalesOrderService::new(db.clone(), None);

    let fully_allocated = service.process_inventory(so.id, actor.id).await.unwrap();
    assert!(!fully_allocated);

    let after = SalesOrderItem::find_by_id(item.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.shipped_quantity, dec!(0));
    assert_eq!(after.status, "pending");

    // Order status is left as approved: nothing shipped at all.
    let order = SalesOrder::find_by_id(so.id).one(&*db).await.unwrap().unwrap();
    assert_eq!(order.status, "approved");
}
