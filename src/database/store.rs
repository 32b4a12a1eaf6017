use async_trait::async_trait;

use crate::error::Result;
use crate::models::balance::TenantBalance;
use crate::models::payment::{
    NewPayment, PaymentFilter, PaymentRecord, PaymentStatus, PaymentSummary, PaymentType,
};
use crate::models::unit::RentalUnit;
use crate::models::webhook_event::WebhookEvent;

/// A conditional status change: applied only while the record is still in `from`.
#[derive(Debug, Clone)]
pub struct Transition {
    pub reference: String,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub transaction_id: Option<String>,
    /// Log entry written in the same atomic unit as the status change.
    pub event: Option<WebhookEvent>,
}

/// Persistence for payments, the webhook audit log and tenant balances.
///
/// `transition` is the only way a payment status changes. Implementations must
/// apply it atomically together with the balance update and the optional event.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: NewPayment) -> Result<PaymentRecord>;
    async fn get_payment(&self, reference: &str) -> Result<Option<PaymentRecord>>;
    /// Newest first, honouring `limit` and `offset`.
    async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<PaymentRecord>>;
    /// Totals over all matching records; `limit` and `offset` are ignored.
    async fn summarize_payments(&self, filter: &PaymentFilter) -> Result<PaymentSummary>;

    /// Returns `None` when no record matched `reference` in state `from`.
    async fn transition(&self, transition: Transition) -> Result<Option<PaymentRecord>>;

    async fn record_event(&self, event: WebhookEvent) -> Result<WebhookEvent>;
    async fn events_for(&self, reference: &str) -> Result<Vec<WebhookEvent>>;

    async fn balances_for(&self, payer_id: &str) -> Result<Vec<TenantBalance>>;
    async fn deposit_paid(&self, payer_id: &str, rental_unit: &str) -> Result<bool>;

    async fn upsert_unit(&self, unit: RentalUnit) -> Result<RentalUnit>;
    async fn get_unit(&self, unit_id: &str) -> Result<Option<RentalUnit>>;
}

/// How a transition moves the payer's running balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceEffect {
    pub delta: i64,
    /// New `deposit_paid` value, when the payment was a security deposit.
    pub deposit_paid: Option<bool>,
}

/// `required_deposit` is the unit's current deposit; a completed deposit below it
/// counts toward the balance but does not mark the deposit as paid.
pub fn balance_effect(
    record: &PaymentRecord,
    to: PaymentStatus,
    required_deposit: Option<i64>,
) -> Option<BalanceEffect> {
    let is_deposit = record.payment_type == PaymentType::SecurityDeposit;
    match to {
        PaymentStatus::Completed => {
            let covers = required_deposit.map_or(false, |required| record.amount >= required);
            Some(BalanceEffect {
                delta: record.amount,
                deposit_paid: (is_deposit && covers).then_some(true),
            })
        }
        PaymentStatus::Refunded => Some(BalanceEffect {
            delta: -record.amount,
            deposit_paid: is_deposit.then_some(false),
        }),
        PaymentStatus::Pending | PaymentStatus::Failed => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::PaymentMethod;
    use chrono::Utc;

    fn deposit(amount: i64) -> PaymentRecord {
        NewPayment {
            reference: "PAY-EFFECT".to_string(),
            amount,
            currency: "KES".to_string(),
            payer_id: "tenant-1".to_string(),
            payer_email: "tenant@example.com".to_string(),
            payer_phone: None,
            rental_unit: "unit-1".to_string(),
            payment_type: PaymentType::SecurityDeposit,
            payment_method: PaymentMethod::Card,
            months_paid_for: None,
        }
        .into_record(Utc::now())
    }

    #[test]
    fn only_a_full_deposit_marks_it_paid() {
        let full = balance_effect(&deposit(565_000), PaymentStatus::Completed, Some(565_000));
        assert_eq!(full.and_then(|e| e.deposit_paid), Some(true));

        let short = balance_effect(&deposit(1), PaymentStatus::Completed, Some(565_000));
        assert_eq!(short.map(|e| (e.delta, e.deposit_paid)), Some((1, None)));

        let unpriced = balance_effect(&deposit(565_000), PaymentStatus::Completed, None);
        assert_eq!(unpriced.and_then(|e| e.deposit_paid), None);
    }

    #[test]
    fn refund_clears_the_deposit() {
        let effect = balance_effect(&deposit(565_000), PaymentStatus::Refunded, Some(565_000));
        assert_eq!(
            effect,
            Some(BalanceEffect {
                delta: -565_000,
                deposit_paid: Some(false)
            })
        );
        assert_eq!(balance_effect(&deposit(1), PaymentStatus::Failed, None), None);
    }
}
