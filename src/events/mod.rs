use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Fire-and-forget variant; a full or closed channel is logged, never surfaced.
    pub fn send_or_log(&self, event: Event) {
        if let Err(err) = self.sender.try_send(event) {
            warn!("Dropping domain event: {}", err);
        }
    }
}

// Domain events emitted after a state change has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    UserRegistered(Uuid),
    CartUpdated {
        user_id: Uuid,
        cart_id: Uuid,
    },
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    PaymentEventIgnored {
        event_type: String,
        reference: Option<String>,
    },
}

/// Consumes the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::UserRegistered(user_id) => {
                info!(%user_id, "user registered");
            }
            Event::CartUpdated { user_id, cart_id } => {
                info!(%user_id, %cart_id, "cart updated");
            }
            Event::OrderCreated {
                order_id,
                user_id,
                total_amount,
            } => {
                info!(%order_id, %user_id, %total_amount, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::PaymentEventIgnored {
                event_type,
                reference,
            } => {
                info!(%event_type, ?reference, "payment event ignored");
            }
        }
    }

    warn!("Event processing loop has ended");
}
