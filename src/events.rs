//! In-process event bus: services publish domain events over an mpsc
//! channel and a spawned processor logs them. Delivery is best-effort;
//! nothing in the request path blocks on a slow consumer.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the storefront core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderPaid(Uuid),
    OrderFulfilled(Uuid),
    InventoryConsumed {
        product_id: Uuid,
        grams_requested: i64,
        grams_consumed: i64,
    },
    StockAdjusted {
        product_id: Uuid,
        old_stock: i32,
        new_stock: i32,
    },
    ProductBatchReceived {
        product_id: Uuid,
        batch_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing channel failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a full or closed channel is logged, never fatal.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.send(event).await {
            warn!("Event dropped: {}", err);
        }
    }
}

/// Drains the event channel, logging each event. Spawned once at startup.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "order status changed"),
            Event::InventoryConsumed {
                product_id,
                grams_requested,
                grams_consumed,
            } => info!(%product_id, grams_requested, grams_consumed, "inventory consumed"),
            other => info!(event = ?other, "event"),
        }
    }
    info!("event channel closed; processor exiting");
}
