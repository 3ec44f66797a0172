#![allow(dead_code)]

use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection};
use std::sync::Arc;

use stockflow_api::{
    db::{establish_connection_with_config, run_migrations, DbConfig},
    entities::{
        employee, inventory_level, product, purchase_order,
        purchase_order_item, sales_order, sales_order_item, stock_adjustment,
        stock_adjustment_item, stock_transfer, stock_transfer_item, warehouse,
    },
};

/// Fresh in-memory database with the full schema applied.
///
/// A single pooled connection keeps every query on the same sqlite
/// in-memory instance.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let db = establish_connection_with_config(&config)
        .await
        .expect("Failed to connect to in-memory sqlite");
    run_migrations(&db).await.expect("Failed to run migrations");
    Arc::new(db)
}

pub async fn create_employee(db: &DatabaseConnection, name: &str) -> employee::Model {
    employee::ActiveModel {
        name: Set(name.to_string()),
        email: Set(format!("{}@example.com", name.to_lowercase().replace(' ', "."))),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create employee")
}

pub async fn create_product(db: &DatabaseConnection, sku: &str, name: &str) -> product::Model {
    product::ActiveModel {
        sku: Set(sku.to_string()),
        name: Set(name.to_string()),
        unit: Set(Some("pcs".to_string())),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create product")
}

pub async fn create_warehouse(db: &DatabaseConnection, code: &str, name: &str) -> warehouse::Model {
    warehouse::ActiveModel {
        code: Set(code.to_string()),
        name: Set(name.to_string()),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create warehouse")
}

/// Seeds a ledger row directly, the way the admin CRUD screens would.
pub async fn seed_level(
    db: &DatabaseConnection,
    product_id: i64,
    warehouse_id: i64,
    quantity: Decimal,
) -> inventory_level::Model {
    inventory_level::ActiveModel {
        product_id: Set(product_id),
        warehouse_id: Set(warehouse_id),
        quantity_available: Set(quantity),
        quantity_reserved: Set(Decimal::ZERO),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to seed inventory level")
}

pub async fn create_purchase_order(
    db: &DatabaseConnection,
    po_number: &str,
    warehouse_id: Option<i64>,
    status: &str,
    created_by: i64,
) -> purchase_order::Model {
    purchase_order::ActiveModel {
        po_number: Set(po_number.to_string()),
        warehouse_id: Set(warehouse_id),
        status: Set(status.to_string()),
        created_by: Set(created_by),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create purchase order")
}

pub async fn create_purchase_order_item(
    db: &DatabaseConnection,
    purchase_order_id: i64,
    product_id: i64,
    quantity: Decimal,
) -> purchase_order_item::Model {
    purchase_order_item::ActiveModel {
        purchase_order_id: Set(purchase_order_id),
        product_id: Set(product_id),
        quantity: Set(quantity),
        received_quantity: Set(Decimal::ZERO),
        status: Set("pending".to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create purchase order item")
}

pub async fn create_sales_order(
    db: &DatabaseConnection,
    so_number: &str,
    status: &str,
    created_by: i64,
) -> sales_order::Model {
    sales_order::ActiveModel {
        so_number: Set(so_number.to_string()),
        status: Set(status.to_string()),
        created_by: Set(created_by),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create sales order")
}

pub async fn create_sales_order_item(
    db: &DatabaseConnection,
    sales_order_id: i64,
    product_id: i64,
    quantity: Decimal,
) -> sales_order_item::Model {
    sales_order_item::ActiveModel {
        sales_order_id: Set(sales_order_id),
        product_id: Set(product_id),
        quantity: Set(quantity),
        shipped_quantity: Set(Decimal::ZERO),
        status: Set("pending".to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create sales order item")
}

pub async fn create_stock_transfer(
    db: &DatabaseConnection,
    transfer_number: &str,
    source_warehouse_id: i64,
    destination_warehouse_id: i64,
    status: &str,
    created_by: i64,
) -> stock_transfer::Model {
    stock_transfer::ActiveModel {
        transfer_number: Set(transfer_number.to_string()),
        source_warehouse_id: Set(source_warehouse_id),
        destination_warehouse_id: Set(destination_warehouse_id),
        status: Set(status.to_string()),
        created_by: Set(created_by),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create stock transfer")
}

pub async fn create_stock_transfer_item(
    db: &DatabaseConnection,
    stock_transfer_id: i64,
    product_id: i64,
    quantity: Decimal,
) -> stock_transfer_item::Model {
    stock_transfer_item::ActiveModel {
        stock_transfer_id: Set(stock_transfer_id),
        product_id: Set(product_id),
        quantity: Set(quantity),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create stock transfer item")
}

pub async fn create_stock_adjustment(
    db: &DatabaseConnection,
    adjustment_number: &str,
    warehouse_id: i64,
    status: &str,
    created_by: i64,
) -> stock_adjustment::Model {
    stock_adjustment::ActiveModel {
        adjustment_number: Set(adjustment_number.to_string()),
        warehouse_id: Set(warehouse_id),
        reason: Set("physical_count".to_string()),
        status: Set(status.to_string()),
        created_by: Set(created_by),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create stock adjustment")
}

pub async fn create_stock_adjustment_item(
    db: &DatabaseConnection,
    stock_adjustment_id: i64,
    product_id: i64,
    current_quantity: Decimal,
    new_quantity: Decimal,
) -> stock_adjustment_item::Model {
    stock_adjustment_item::ActiveModel {
        stock_adjustment_id: Set(stock_adjustment_id),
        product_id: Set(product_id),
        current_quantity: Set(current_quantity),
        new_quantity: Set(new_quantity),
        quantity: Set(new_quantity - current_quantity),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create stock adjustment item")
}
