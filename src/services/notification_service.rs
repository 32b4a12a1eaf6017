use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

use crate::models::payment::{PaymentRecord, PaymentStatus};

const QUEUE_CAPACITY: usize = 1024;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub event: String,
    pub reference: String,
    pub payer_id: String,
    pub payer_email: String,
    pub rental_unit: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl PaymentNotification {
    pub fn from_record(record: &PaymentRecord) -> Self {
        Self {
            event: format!("payment.{}", record.status),
            reference: record.reference.clone(),
            payer_id: record.payer_id.clone(),
            payer_email: record.payer_email.clone(),
            rental_unit: record.rental_unit.clone(),
            amount: record.amount,
            currency: record.currency.clone(),
            status: record.status,
            detail: None,
            occurred_at: record.updated_at,
        }
    }

    /// Operator alert: the processor reported `reported` for a payment that cannot
    /// take it.
    pub fn conflict(record: &PaymentRecord, reported: PaymentStatus, reason: &str) -> Self {
        Self {
            event: "payment.conflict".to_string(),
            detail: Some(format!("reported {}: {}", reported, reason)),
            occurred_at: Utc::now(),
            ..Self::from_record(record)
        }
    }
}

/// Fire-and-forget handle for downstream payment notifications.
#[derive(Clone)]
pub struct NotificationService {
    sender: mpsc::Sender<PaymentNotification>,
}

impl NotificationService {
    /// A handle plus the receiving end, for callers that drain the queue themselves.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PaymentNotification>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Starts a background worker that delivers to `target_url`, or only logs when unset.
    pub fn spawn(client: Client, target_url: Option<String>) -> Self {
        let (service, receiver) = Self::channel(QUEUE_CAPACITY);
        let worker = NotificationWorker::new(receiver, client, target_url);
        tokio::spawn(worker.run());
        service
    }

    /// Never waits on delivery; a full or closed queue is logged and dropped.
    pub fn notify(&self, notification: PaymentNotification) {
        match self.sender.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                warn!(reference = %n.reference, "notification queue full, dropping notification");
            }
            Err(TrySendError::Closed(n)) => {
                warn!(reference = %n.reference, "notification worker stopped, dropping notification");
            }
        }
    }
}

pub struct NotificationWorker {
    receiver: mpsc::Receiver<PaymentNotification>,
    client: Client,
    target_url: Option<String>,
    max_attempts: u32,
    base_delay: Duration,
}

impl NotificationWorker {
    pub fn new(
        receiver: mpsc::Receiver<PaymentNotification>,
        client: Client,
        target_url: Option<String>,
    ) -> Self {
        Self {
            receiver,
            client,
            target_url: target_url.filter(|url| !url.trim().is_empty()),
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    pub async fn run(mut self) {
        while let Some(notification) = self.receiver.recv().await {
            self.deliver(&notification).await;
        }
        info!("notification worker shutting down");
    }

    /// Returns whether the notification reached the target.
    pub async fn deliver(&self, notification: &PaymentNotification) -> bool {
        let Some(url) = &self.target_url else {
            info!(
                reference = %notification.reference,
                event = %notification.event,
                "payment notification (no NOTIFICATION_URL configured)"
            );
            return true;
        };

        for attempt in 1..=self.max_attempts {
            match self.client.post(url).json(notification).send().await {
                Ok(resp) if resp.status().is_success() => return true,
                Ok(resp) => {
                    warn!(
                        reference = %notification.reference,
                        attempt,
                        status = resp.status().as_u16(),
                        "notification delivery rejected"
                    );
                }
                Err(err) => {
                    warn!(reference = %notification.reference, attempt, error = %err, "notification delivery failed");
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay(attempt)).await;
            }
        }
        false
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }
}
