pub mod inventory;
pub mod purchase_orders;
pub mod sales_orders;
pub mod stock_adjustments;
pub mod stock_transfers;

pub use inventory::InventoryService;
pub use purchase_orders::PurchaseOrderService;
pub use sales_orders::SalesOrderService;
pub use stock_adjustments::StockAdjustmentService;
pub use stock_transfers::StockTransferService;

/// Formats a generated document number, e.g. `PO000042`.
pub(crate) fn format_document_number(prefix: &str, width: usize, n: i64) -> String {
    format!("{}{:0>width$}", prefix, n, width = width)
}

#[cfg(test)]
mod tests {
    use super::format_document_number;
    use test_case::test_case;

    #[test_case("PO", 6, 1 => "PO000001")]
    #[test_case("TRF", 6, 42 => "TRF000042")]
    #[test_case("ADJ", 4, 12345 => "ADJ12345"; "wider ids are not truncated")]
    fn document_numbers(prefix: &str, width: usize, n: i64) -> String {
        format_document_number(prefix, width, n)
    }
}
