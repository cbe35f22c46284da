//! Delivery transport that writes each message to the log instead of a
//! device. Used by the CLI and local runs.

use chrono::Utc;
use notify_core::error::NotifyResult;
use notify_core::store::{DeliveryReceipt, NotificationDeliveryService};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use uuid::Uuid;

#[derive(Default)]
pub struct LoggingDelivery {
    sent: AtomicU64,
}

impl LoggingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl NotificationDeliveryService for LoggingDelivery {
    fn send(
        &self,
        title: &str,
        body: &str,
        metadata: &HashMap<String, String>,
        destination_token: &str,
    ) -> NotifyResult<DeliveryReceipt> {
        let message_id = Uuid::new_v4().to_string();
        info!(
            message_id = %message_id,
            destination = destination_token,
            notification_type = metadata.get("type").map(String::as_str).unwrap_or("unknown"),
            title,
            body,
            "Delivered notification"
        );
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(DeliveryReceipt {
            message_id,
            delivered_at: Utc::now(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_sends() {
        let delivery = LoggingDelivery::new();
        let receipt = delivery
            .send("Hi", "There", &HashMap::new(), "token-1")
            .unwrap();
        assert!(!receipt.message_id.is_empty());
        assert_eq!(delivery.sent_count(), 1);
    }
}
