use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

/// Lifecycle of a payment attempt.
///
/// Valid moves are `Pending -> Completed`, `Pending -> Failed` and
/// `Completed -> Refunded`. Everything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Completed, PaymentStatus::Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Rent,
    SecurityDeposit,
    Other,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Rent => "rent",
            PaymentType::SecurityDeposit => "security_deposit",
            PaymentType::Other => "other",
        }
    }
}

impl FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rent" => Ok(PaymentType::Rent),
            "security_deposit" => Ok(PaymentType::SecurityDeposit),
            "other" => Ok(PaymentType::Other),
            other => Err(format!("unknown payment type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Mpesa,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "mpesa",
            PaymentMethod::Card => "card",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mpesa" => Ok(PaymentMethod::Mpesa),
            "card" => Ok(PaymentMethod::Card),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

/// An authoritative result reported by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success,
    Failed,
    Refunded,
}

impl PaymentOutcome {
    pub fn target_status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Success => PaymentStatus::Completed,
            PaymentOutcome::Failed => PaymentStatus::Failed,
            PaymentOutcome::Refunded => PaymentStatus::Refunded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub reference: String,
    pub amount: i64,
    pub currency: String,
    pub payer_id: String,
    pub payer_email: String,
    pub payer_phone: Option<String>,
    pub rental_unit: String,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    pub months_paid_for: Option<i32>,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub last_event_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for PaymentRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            reference: row.try_get("reference")?,
            amount: row.try_get("amount")?,
            currency: row.try_get("currency")?,
            payer_id: row.try_get("payer_id")?,
            payer_email: row.try_get("payer_email")?,
            payer_phone: row.try_get("payer_phone")?,
            rental_unit: row.try_get("rental_unit")?,
            payment_type: decode_column(row, "payment_type")?,
            payment_method: decode_column(row, "payment_method")?,
            months_paid_for: row.try_get("months_paid_for")?,
            status: decode_column(row, "status")?,
            transaction_id: row.try_get("transaction_id")?,
            last_event_id: row.try_get("last_event_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }
}

/// Reads a text column and parses it into one of the enums above.
pub(crate) fn decode_column<T>(row: &PgRow, column: &str) -> sqlx::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

/// Fields supplied when a payer starts a payment; the store fills in the rest.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub reference: String,
    pub amount: i64,
    pub currency: String,
    pub payer_id: String,
    pub payer_email: String,
    pub payer_phone: Option<String>,
    pub rental_unit: String,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    pub months_paid_for: Option<i32>,
}

impl NewPayment {
    pub fn into_record(self, now: DateTime<Utc>) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            reference: self.reference,
            amount: self.amount,
            currency: self.currency,
            payer_id: self.payer_id,
            payer_email: self.payer_email,
            payer_phone: self.payer_phone,
            rental_unit: self.rental_unit,
            payment_type: self.payment_type,
            payment_method: self.payment_method,
            months_paid_for: self.months_paid_for,
            status: PaymentStatus::Pending,
            transaction_id: None,
            last_event_id: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub payment_type: Option<PaymentType>,
    pub payer_id: Option<String>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaymentFilter {
    pub fn matches(&self, record: &PaymentRecord) -> bool {
        self.status.map_or(true, |s| record.status == s)
            && self.payment_type.map_or(true, |t| record.payment_type == t)
            && self
                .payer_id
                .as_deref()
                .map_or(true, |p| record.payer_id == p)
            && self.created_before.map_or(true, |b| record.created_at < b)
    }
}

/// Totals over every record a filter matches, regardless of paging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentSummary {
    pub total: i64,
    pub pending: i64,
    pub completed_amount: i64,
}

impl PaymentSummary {
    pub fn add(&mut self, record: &PaymentRecord) {
        self.total += 1;
        match record.status {
            PaymentStatus::Pending => self.pending += 1,
            PaymentStatus::Completed => self.completed_amount += record.amount,
            PaymentStatus::Failed | PaymentStatus::Refunded => {}
        }
    }
}
