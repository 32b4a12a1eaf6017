use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use super::payment::decode_column;

/// What happened to an inbound webhook call. Fixed at insert time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Rejected,
    Malformed,
    Ignored,
    Applied,
    Duplicate,
    /// The report contradicts the recorded state or the recorded charge.
    Conflict,
    UnknownReference,
    InvalidTransition,
    Error,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Rejected => "rejected",
            WebhookOutcome::Malformed => "malformed",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::Applied => "applied",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Conflict => "conflict",
            WebhookOutcome::UnknownReference => "unknown_reference",
            WebhookOutcome::InvalidTransition => "invalid_transition",
            WebhookOutcome::Error => "error",
        }
    }
}

impl FromStr for WebhookOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rejected" => Ok(WebhookOutcome::Rejected),
            "malformed" => Ok(WebhookOutcome::Malformed),
            "ignored" => Ok(WebhookOutcome::Ignored),
            "applied" => Ok(WebhookOutcome::Applied),
            "duplicate" => Ok(WebhookOutcome::Duplicate),
            "conflict" => Ok(WebhookOutcome::Conflict),
            "unknown_reference" => Ok(WebhookOutcome::UnknownReference),
            "invalid_transition" => Ok(WebhookOutcome::InvalidTransition),
            "error" => Ok(WebhookOutcome::Error),
            other => Err(format!("unknown webhook outcome '{}'", other)),
        }
    }
}

/// Audit row for one inbound webhook call. Insert-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub payload_digest: String,
    pub signature_valid: bool,
    pub event_type: Option<String>,
    pub reference: Option<String>,
    pub outcome: WebhookOutcome,
}

impl<'r> FromRow<'r, PgRow> for WebhookEvent {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            received_at: row.try_get("received_at")?,
            payload_digest: row.try_get("payload_digest")?,
            signature_valid: row.try_get("signature_valid")?,
            event_type: row.try_get("event_type")?,
            reference: row.try_get("reference")?,
            outcome: decode_column(row, "outcome")?,
        })
    }
}

/// Everything known about a webhook call before reconciliation runs.
#[derive(Debug, Clone)]
pub struct WebhookReceipt {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub payload_digest: String,
    pub signature_valid: bool,
    pub event_type: Option<String>,
    pub reference: Option<String>,
}

impl WebhookReceipt {
    pub fn new(payload_digest: String, signature_valid: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            payload_digest,
            signature_valid,
            event_type: None,
            reference: None,
        }
    }

    pub fn into_event(self, outcome: WebhookOutcome) -> WebhookEvent {
        WebhookEvent {
            id: self.id,
            received_at: self.received_at,
            payload_digest: self.payload_digest,
            signature_valid: self.signature_valid,
            event_type: self.event_type,
            reference: self.reference,
            outcome,
        }
    }
}
