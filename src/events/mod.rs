use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Events emitted by the inventory and order services after commit.
///
/// Delivery is best-effort: a full or closed channel is logged and
/// otherwise ignored so event plumbing can never fail a committed
/// stock movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Purchase order lifecycle
    PurchaseOrderApproved(i64),
    PurchaseOrderCancelled(i64),
    PurchaseOrderReceived {
        purchase_order_id: i64,
        warehouse_id: i64,
    },

    // Sales order lifecycle
    SalesOrderApproved(i64),
    SalesOrderCancelled(i64),
    SalesOrderAllocated {
        sales_order_id: i64,
        fully_allocated: bool,
    },
    PartialAllocationWarning {
        sales_order_id: i64,
        product_id: i64,
        requested_quantity: Decimal,
        allocated_quantity: Decimal,
    },

    // Stock transfer lifecycle
    StockTransferApproved(i64),
    StockTransferCompleted(i64),
    StockTransferCancelled(i64),
    StockTransferred {
        product_id: i64,
        source_warehouse_id: i64,
        destination_warehouse_id: i64,
        quantity: Decimal,
    },

    // Stock adjustment lifecycle
    StockAdjustmentApproved(i64),
    StockAdjustmentProcessed(i64),
    StockAdjustmentCancelled(i64),

    // Ledger-level signal for downstream consumers (reporting, reorder alerts)
    InventoryUpdated {
        product_id: i64,
        warehouse_id: i64,
        new_available: Decimal,
    },
}

/// Envelope pairing an event with a correlation id for downstream tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<EventEnvelope>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<EventEnvelope>) -> Self {
        Self { sender }
    }

    /// Sends an event, failing if the channel is closed or full.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(EventEnvelope::new(event))
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs on failure instead of propagating it.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Creates a bounded event channel and a sender wrapping it.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<EventEnvelope>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_enveloped_event() {
        let (sender, mut rx) = channel(4);
        sender
            .send(Event::StockTransferCompleted(7))
            .await
            .expect("send should succeed");

        let envelope = rx.recv().await.expect("event should be delivered");
        assert!(matches!(envelope.event, Event::StockTransferCompleted(7)));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);
        // Must not panic or error out.
        sender.send_or_log(Event::SalesOrderApproved(1)).await;
    }
}
