use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::database::store::{PaymentStore, Transition};
use crate::error::{Error, Result};
use crate::models::payment::{PaymentOutcome, PaymentRecord, PaymentStatus};
use crate::models::webhook_event::{WebhookOutcome, WebhookReceipt};
use crate::services::notification_service::{NotificationService, PaymentNotification};

/// A compare-and-set miss means another writer moved the record first.
const MAX_CAS_ATTEMPTS: usize = 3;

/// Where an outcome came from. Webhook deliveries carry the receipt that becomes
/// their audit log entry.
#[derive(Debug, Clone)]
pub enum ReconciliationSource {
    Webhook(WebhookReceipt),
    Verification,
    Initialization,
    Operator { user_id: String },
}

/// What the processor reported alongside an outcome. Amount and currency, when
/// present, must match the record before a payment is completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChargeDetails {
    pub transaction_id: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

impl ChargeDetails {
    pub fn transaction(id: impl Into<String>) -> Self {
        Self {
            transaction_id: Some(id.into()),
            ..Self::default()
        }
    }

    fn mismatch(&self, record: &PaymentRecord) -> Option<String> {
        if let Some(amount) = self.amount.filter(|a| *a != record.amount) {
            return Some(format!(
                "reported amount {} does not match {}",
                amount, record.amount
            ));
        }
        match &self.currency {
            Some(currency) if !currency.eq_ignore_ascii_case(&record.currency) => Some(format!(
                "reported currency {} does not match {}",
                currency, record.currency
            )),
            _ => None,
        }
    }
}

impl ReconciliationSource {
    fn label(&self) -> &'static str {
        match self {
            ReconciliationSource::Webhook(_) => "webhook",
            ReconciliationSource::Verification => "verification",
            ReconciliationSource::Initialization => "initialization",
            ReconciliationSource::Operator { .. } => "operator",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationResult {
    Applied(PaymentRecord),
    AlreadyReconciled(PaymentRecord),
    /// Nothing was changed because the report contradicts the record: a different
    /// terminal outcome, or a charge for another amount or currency. Operators are
    /// alerted.
    Conflict(PaymentRecord),
}

impl ReconciliationResult {
    pub fn record(&self) -> &PaymentRecord {
        match self {
            ReconciliationResult::Applied(r)
            | ReconciliationResult::AlreadyReconciled(r)
            | ReconciliationResult::Conflict(r) => r,
        }
    }

    pub fn into_record(self) -> PaymentRecord {
        match self {
            ReconciliationResult::Applied(r)
            | ReconciliationResult::AlreadyReconciled(r)
            | ReconciliationResult::Conflict(r) => r,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ReconciliationResult::Applied(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Transition,
    AlreadyReconciled,
    Conflict,
    Invalid,
}

fn decide(current: PaymentStatus, target: PaymentStatus) -> Decision {
    if current.can_transition_to(target) {
        Decision::Transition
    } else if current == target
        // A charge report arriving after its refund.
        || (current == PaymentStatus::Refunded && target == PaymentStatus::Completed)
    {
        Decision::AlreadyReconciled
    } else if current.is_terminal() && target.is_terminal() {
        Decision::Conflict
    } else {
        Decision::Invalid
    }
}

/// Single writer of terminal payment state.
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn PaymentStore>,
    notifier: NotificationService,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn PaymentStore>, notifier: NotificationService) -> Self {
        Self { store, notifier }
    }

    pub async fn apply(
        &self,
        reference: &str,
        outcome: PaymentOutcome,
        details: ChargeDetails,
        source: ReconciliationSource,
    ) -> Result<ReconciliationResult> {
        self.apply_status(reference, outcome.target_status(), details, source)
            .await
    }

    /// Moves `reference` to `target` at most once.
    ///
    /// When the source is a webhook, exactly one log entry is written for the call:
    /// inside the transition when it applies, otherwise afterwards with the outcome.
    pub async fn apply_status(
        &self,
        reference: &str,
        target: PaymentStatus,
        details: ChargeDetails,
        source: ReconciliationSource,
    ) -> Result<ReconciliationResult> {
        let origin = source.label();
        if let ReconciliationSource::Operator { user_id } = &source {
            info!(reference, %target, operator = %user_id, "manual status change requested");
        }
        let mut receipt = match source {
            ReconciliationSource::Webhook(receipt) => Some(receipt),
            _ => None,
        };

        let result = self
            .reconcile(reference, target, details, &mut receipt, origin)
            .await;

        if let Some(receipt) = receipt {
            let outcome = match &result {
                Ok(ReconciliationResult::Applied(_)) => WebhookOutcome::Applied,
                Ok(ReconciliationResult::AlreadyReconciled(_)) => WebhookOutcome::Duplicate,
                Ok(ReconciliationResult::Conflict(_)) => WebhookOutcome::Conflict,
                Err(Error::UnknownReference(_)) => WebhookOutcome::UnknownReference,
                Err(Error::InvalidTransition { .. }) => WebhookOutcome::InvalidTransition,
                Err(_) => WebhookOutcome::Error,
            };
            self.store.record_event(receipt.into_event(outcome)).await?;
        }

        result
    }

    async fn reconcile(
        &self,
        reference: &str,
        target: PaymentStatus,
        details: ChargeDetails,
        receipt: &mut Option<WebhookReceipt>,
        origin: &'static str,
    ) -> Result<ReconciliationResult> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(current) = self.store.get_payment(reference).await? else {
                warn!(reference, origin, "reconciliation for unknown payment reference");
                return Err(Error::UnknownReference(reference.to_string()));
            };

            let decision = decide(current.status, target);
            if decision == Decision::Transition && target == PaymentStatus::Completed {
                if let Some(reason) = details.mismatch(&current) {
                    return Ok(self.conflict(current, target, origin, &reason));
                }
            }

            match decision {
                Decision::Transition => {
                    let event = receipt
                        .as_ref()
                        .map(|r| r.clone().into_event(WebhookOutcome::Applied));
                    let transition = Transition {
                        reference: reference.to_string(),
                        from: current.status,
                        to: target,
                        transaction_id: details.transaction_id.clone(),
                        event,
                    };
                    match self.store.transition(transition).await? {
                        Some(updated) => {
                            receipt.take();
                            info!(
                                reference,
                                origin,
                                from = %current.status,
                                to = %updated.status,
                                "payment reconciled"
                            );
                            self.notifier
                                .notify(PaymentNotification::from_record(&updated));
                            return Ok(ReconciliationResult::Applied(updated));
                        }
                        None => {
                            debug!(reference, origin, "payment changed concurrently, re-reading");
                            continue;
                        }
                    }
                }
                Decision::AlreadyReconciled => {
                    debug!(reference, origin, status = %current.status, "duplicate reconciliation ignored");
                    return Ok(ReconciliationResult::AlreadyReconciled(current));
                }
                Decision::Conflict => {
                    let reason = format!("payment is already {}", current.status);
                    return Ok(self.conflict(current, target, origin, &reason));
                }
                Decision::Invalid => {
                    error!(
                        reference,
                        origin,
                        from = %current.status,
                        to = %target,
                        "invalid payment transition"
                    );
                    return Err(Error::InvalidTransition {
                        reference: reference.to_string(),
                        from: current.status,
                        to: target,
                    });
                }
            }
        }

        Err(Error::Internal(format!(
            "payment {} kept changing during reconciliation",
            reference
        )))
    }

    fn conflict(
        &self,
        current: PaymentRecord,
        reported: PaymentStatus,
        origin: &'static str,
        reason: &str,
    ) -> ReconciliationResult {
        error!(
            reference = %current.reference,
            origin,
            current = %current.status,
            %reported,
            reason,
            "conflicting payment report, operator attention needed"
        );
        self.notifier
            .notify(PaymentNotification::conflict(&current, reported, reason));
        ReconciliationResult::Conflict(current)
    }
}
