use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted by the order lifecycle coordinator after its
/// transaction commits. Consumers (webhooks, notifications, dashboards)
/// live outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderUpdated(Uuid),
    OrderDeleted(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    InventoryAdjusted {
        inventory_id: Uuid,
        product_id: Uuid,
        movement_type: String,
        quantity: i32,
        previous_quantity: i32,
        new_quantity: i32,
        reference: Option<String>,
    },
    LowStock {
        inventory_id: Uuid,
        product_id: Uuid,
        available: i32,
        reorder_point: i32,
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

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, logging each event. Spawn alongside the
/// services that hold the matching `EventSender`.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(event = ?event, "Processing event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();
        sender.send(Event::OrderCreated(order_id)).await.unwrap();
        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::OrderUpdated(Uuid::new_v4())).await.is_err());
    }
}
