use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

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

    /// Sends an event, logging instead of failing when the consumer is gone.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

// Domain events published after the owning transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderClaimed {
        order_id: Uuid,
        lines: usize,
        total_price: Decimal,
    },
    OrderDeleted(Uuid),
    StockDepleted {
        inventory_id: Uuid,
        product_type: String,
        level: String,
        size: Option<String>,
        quantity: i32,
    },
    StockReplenished {
        inventory_id: Uuid,
        quantity: i32,
    },
    ProductionCompleted {
        production_id: Uuid,
        quantity: i32,
        completed_at: DateTime<Utc>,
    },
    SalesReportReconciled {
        report_id: Uuid,
        total_revenue: Decimal,
    },
}

// Consumes events until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated(order_id) => {
                info!(%order_id, "Order created");
            }
            Event::OrderClaimed {
                order_id,
                lines,
                total_price,
            } => {
                info!(%order_id, lines, %total_price, "Order claimed");
            }
            Event::OrderDeleted(order_id) => {
                info!(%order_id, "Order deleted");
            }
            Event::StockDepleted {
                inventory_id,
                product_type,
                level,
                size,
                quantity,
            } => {
                warn!(
                    %inventory_id,
                    product_type = %product_type,
                    level = %level,
                    size = size.as_deref().unwrap_or("-"),
                    quantity,
                    "Stock depleted"
                );
            }
            Event::StockReplenished {
                inventory_id,
                quantity,
            } => {
                info!(%inventory_id, quantity, "Stock replenished");
            }
            Event::ProductionCompleted {
                production_id,
                quantity,
                completed_at,
            } => {
                info!(%production_id, quantity, %completed_at, "Production completed");
            }
            Event::SalesReportReconciled {
                report_id,
                total_revenue,
            } => {
                info!(%report_id, %total_revenue, "Sales report reconciled");
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (sender, mut rx) = channel(4);
        let id = Uuid::new_v4();
        sender.send(Event::OrderCreated(id)).await.unwrap();
        assert_eq!(rx.recv().await, Some(Event::OrderCreated(id)));
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_dropped() {
        let (sender, rx) = channel(1);
        drop(rx);
        assert!(sender.send(Event::OrderDeleted(Uuid::new_v4())).await.is_err());
        // must not panic
        sender.send_or_log(Event::OrderDeleted(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn process_events_drains_until_closed() {
        let (sender, rx) = channel(8);
        sender.send(Event::OrderCreated(Uuid::new_v4())).await.unwrap();
        sender
            .send(Event::StockReplenished {
                inventory_id: Uuid::new_v4(),
                quantity: 3,
            })
            .await
            .unwrap();
        drop(sender);
        process_events(rx).await;
    }
}
