//! Stockflow API Library
//!
//! Inventory control core: the stock ledger, its append-only transaction
//! log, the movement services (purchase receipt, sales allocation, stock
//! transfer, stock adjustment), and the order approval workflows that
//! drive them. Presentation layers consume these services directly.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use services::{
    InventoryService, PurchaseOrderService, SalesOrderService, StockAdjustmentService,
    StockTransferService,
};

/// Shared application state wiring the services together.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub inventory: Arc<InventoryService>,
    pub purchase_orders: Arc<PurchaseOrderService>,
    pub sales_orders: Arc<SalesOrderService>,
    pub stock_transfers: Arc<StockTransferService>,
    pub stock_adjustments: Arc<StockAdjustmentService>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let numbering = config.document_numbers.clone();
        let sender = Some(event_sender.clone());

        let inventory = Arc::new(InventoryService::new(db.clone(), sender.clone()));
        let purchase_orders = Arc::new(
            PurchaseOrderService::new(db.clone(), sender.clone())
                .with_numbering(numbering.clone()),
        );
        let sales_orders = Arc::new(
            SalesOrderService::new(db.clone(), sender.clone()).with_numbering(numbering.clone()),
        );
        let stock_transfers = Arc::new(
            StockTransferService::new(db.clone(), inventory.clone(), sender.clone())
                .with_numbering(numbering.clone()),
        );
        let stock_adjustments = Arc::new(
            StockAdjustmentService::new(db.clone(), sender).with_numbering(numbering),
        );

        Self {
            db,
            config,
            event_sender,
            inventory,
            purchase_orders,
            sales_orders,
            stock_transfers,
            stock_adjustments,
        }
    }
}
