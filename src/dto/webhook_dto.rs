use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::models::payment::PaymentOutcome;
use crate::services::gateway_service::json_id;
use crate::services::reconciliation_service::ChargeDetails;

/// Paystack webhook body: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaystackEvent {
    pub event: String,
    pub data: PaystackEventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaystackEventData {
    pub id: Option<JsonValue>,
    pub reference: Option<String>,
    /// Refund events point at the original charge through this field.
    pub transaction_reference: Option<String>,
    pub status: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

impl PaystackEvent {
    pub fn outcome(&self) -> Option<PaymentOutcome> {
        match self.event.as_str() {
            "charge.success" => Some(PaymentOutcome::Success),
            "charge.failed" => Some(PaymentOutcome::Failed),
            "refund.processed" => Some(PaymentOutcome::Refunded),
            _ => None,
        }
    }

    pub fn reference(&self) -> Option<String> {
        let reference = if self.event.starts_with("refund.") {
            self.data
                .transaction_reference
                .as_ref()
                .or(self.data.reference.as_ref())
        } else {
            self.data.reference.as_ref()
        };
        reference.filter(|r| !r.trim().is_empty()).cloned()
    }

    /// The processor's transaction id; refunds keep the charge's id untouched.
    pub fn transaction_id(&self) -> Option<String> {
        if self.event.starts_with("refund.") {
            return None;
        }
        self.data.id.as_ref().and_then(json_id)
    }

    /// Refund amounts may be partial, so only charge events carry amount and
    /// currency for checking.
    pub fn charge_details(&self) -> ChargeDetails {
        if self.event.starts_with("refund.") {
            return ChargeDetails::default();
        }
        ChargeDetails {
            transaction_id: self.transaction_id(),
            amount: self.data.amount,
            currency: self.data.currency.clone(),
        }
    }
}
