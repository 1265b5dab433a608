use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Stock level at or below which a completed sale logs a warning.
pub const LOW_STOCK_THRESHOLD: i64 = 5;

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

    /// Sends an event, logging instead of failing when the processor is gone.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Domain events emitted after a ledger write commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ItemsIngested {
        business_id: Uuid,
        batch_key: String,
        applied: usize,
        failed: usize,
    },
    SaleRecorded {
        business_id: Uuid,
        entry_id: Uuid,
        item_name: String,
        quantity: i64,
        remaining: i64,
    },
    ReportGenerated {
        business_id: Uuid,
        report_id: Uuid,
        report_type: String,
        artifact_name: String,
    },
    ReportingSettingsUpdated {
        business_id: Uuid,
        reporting_frequency: String,
    },
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::ItemsIngested {
                business_id,
                batch_key,
                applied,
                failed,
            } => {
                if failed > 0 {
                    warn!(%business_id, %batch_key, applied, failed, "ingestion batch partially failed");
                } else {
                    info!(%business_id, %batch_key, applied, "ingestion batch applied");
                }
            }
            Event::SaleRecorded {
                business_id,
                entry_id,
                item_name,
                quantity,
                remaining,
            } => {
                info!(%business_id, %entry_id, item = %item_name, quantity, remaining, "sale recorded");
                if remaining <= LOW_STOCK_THRESHOLD {
                    warn!(%business_id, item = %item_name, remaining, "stock is running low");
                }
            }
            Event::ReportGenerated {
                business_id,
                report_id,
                report_type,
                artifact_name,
            } => {
                info!(%business_id, %report_id, %report_type, %artifact_name, "inventory report generated");
            }
            Event::ReportingSettingsUpdated {
                business_id,
                reporting_frequency,
            } => {
                info!(%business_id, %reporting_frequency, "reporting settings updated");
            }
        }
    }

    warn!("Event processing loop ended");
}
