use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::balance::TenantBalance;
use crate::models::payment::{
    PaymentMethod, PaymentRecord, PaymentStatus, PaymentSummary, PaymentType,
};
use crate::models::unit::RentalUnit;
use crate::services::gateway_service::PaymentPrompt;
use crate::utils::phone::validate_kenyan_phone;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InitiatePaymentPayload {
    /// Minor currency units (cents). Rent and deposits are priced from the unit;
    /// when given for those, it must match.
    #[validate(range(min = 1))]
    pub amount: Option<i64>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[validate(email)]
    pub email: String,
    #[validate(custom(function = "validate_kenyan_phone"))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub rental_unit: String,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    #[validate(range(min = 1, max = 6))]
    pub months_paid_for: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub reference: String,
    pub amount: i64,
    pub amount_display: String,
    pub currency: String,
    pub payer_id: String,
    pub rental_unit: String,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    pub months_paid_for: Option<i32>,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<PaymentRecord> for PaymentResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            amount_display: format_amount(record.amount, &record.currency),
            reference: record.reference,
            amount: record.amount,
            currency: record.currency,
            payer_id: record.payer_id,
            rental_unit: record.rental_unit,
            payment_type: record.payment_type,
            payment_method: record.payment_method,
            months_paid_for: record.months_paid_for,
            status: record.status,
            transaction_id: record.transaction_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            processed_at: record.processed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatePaymentResponse {
    pub payment: PaymentResponse,
    pub prompt: PaymentPrompt,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentListQuery {
    pub status: Option<String>,
    pub payment_type: Option<String>,
    pub payer_id: Option<String>,
    /// 1-based.
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentListResponse {
    pub items: Vec<PaymentResponse>,
    pub page: i64,
    pub limit: i64,
    #[serde(flatten)]
    pub summary: PaymentSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateStatusPayload {
    #[validate(length(min = 1))]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub payer_id: String,
    pub balances: Vec<TenantBalance>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UnitRentPayload {
    #[validate(range(min = 1i64, max = 10_000_000_000i64))]
    pub monthly_rent: i64,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitResponse {
    pub unit_id: String,
    pub monthly_rent: i64,
    pub monthly_rent_display: String,
    pub deposit_amount: i64,
    pub deposit_display: String,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

impl From<RentalUnit> for UnitResponse {
    fn from(unit: RentalUnit) -> Self {
        let deposit_amount = unit.deposit_amount();
        Self {
            monthly_rent_display: format_amount(unit.monthly_rent, &unit.currency),
            deposit_display: format_amount(deposit_amount, &unit.currency),
            deposit_amount,
            unit_id: unit.unit_id,
            monthly_rent: unit.monthly_rent,
            currency: unit.currency,
            updated_at: unit.updated_at,
        }
    }
}

/// Renders minor units as `KES 5,000.00`.
pub fn format_amount(amount: i64, currency: &str) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    let whole = (abs / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{} {}{}.{:02}", currency, sign, grouped, abs % 100)
}
