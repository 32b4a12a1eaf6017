use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::database::store::PaymentStore;
use crate::dto::payment_dto::InitiatePaymentPayload;
use crate::error::{Error, Result};
use crate::models::balance::TenantBalance;
use crate::dto::payment_dto::format_amount;
use crate::models::payment::{
    NewPayment, PaymentFilter, PaymentMethod, PaymentOutcome, PaymentRecord, PaymentStatus,
    PaymentSummary, PaymentType,
};
use crate::models::role::Role;
use crate::models::unit::RentalUnit;
use crate::models::webhook_event::WebhookEvent;
use crate::services::gateway_service::{
    is_unknown_transaction, InitializeRequest, PaymentGateway, PaymentPrompt,
};
use crate::services::reconciliation_service::{
    ChargeDetails, ReconciliationEngine, ReconciliationResult, ReconciliationSource,
};
use crate::utils::phone::normalize_kenyan_phone;
use crate::utils::reference::generate_reference;

const STALE_BATCH_SIZE: i64 = 100;

/// The authenticated caller, as established by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: String,
    pub role: Role,
}

impl Viewer {
    fn can_see(&self, payer_id: &str) -> bool {
        self.role.sees_all_payments() || self.user_id == payer_id
    }
}

#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub record: PaymentRecord,
    pub prompt: PaymentPrompt,
}

/// One page of payments plus totals over everything the filter matched.
#[derive(Debug, Clone)]
pub struct PaymentPage {
    pub records: Vec<PaymentRecord>,
    pub summary: PaymentSummary,
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    engine: ReconciliationEngine,
    config: Arc<Config>,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        engine: ReconciliationEngine,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            gateway,
            engine,
            config,
        }
    }

    /// Creates a Pending record and asks the gateway to start collecting it.
    ///
    /// Rent and deposit amounts come from the unit's stored rent. A definitive
    /// gateway rejection marks the record Failed. When the gateway could not be
    /// reached the charge may still exist there, so the record stays Pending for
    /// the webhook, verification or the stale sweep to settle.
    pub async fn initialize(
        &self,
        payer_id: &str,
        payload: InitiatePaymentPayload,
    ) -> Result<InitiatedPayment> {
        let months_paid_for = match payload.payment_type {
            PaymentType::Rent => Some(payload.months_paid_for.ok_or_else(|| {
                Error::BadRequest("months_paid_for is required for rent payments".to_string())
            })?),
            _ => None,
        };

        let phone = payload
            .phone
            .as_deref()
            .map(|raw| {
                normalize_kenyan_phone(raw)
                    .ok_or_else(|| Error::BadRequest(format!("Invalid phone number: {}", raw)))
            })
            .transpose()?;
        if payload.payment_method == PaymentMethod::Mpesa && phone.is_none() {
            return Err(Error::BadRequest(
                "A phone number is required for M-Pesa payments".to_string(),
            ));
        }

        let (amount, currency) = self.price(&payload, months_paid_for).await?;

        if payload.payment_type == PaymentType::Rent
            && !self
                .store
                .deposit_paid(payer_id, &payload.rental_unit)
                .await?
        {
            return Err(Error::BadRequest(
                "Security deposit must be paid before making rent payments".to_string(),
            ));
        }

        let record = self
            .store
            .insert_payment(NewPayment {
                reference: generate_reference(),
                amount,
                currency,
                payer_id: payer_id.to_string(),
                payer_email: payload.email.clone(),
                payer_phone: phone.clone(),
                rental_unit: payload.rental_unit.clone(),
                payment_type: payload.payment_type,
                payment_method: payload.payment_method,
                months_paid_for,
            })
            .await?;
        info!(
            reference = %record.reference,
            payer = payer_id,
            amount = record.amount,
            currency = %record.currency,
            "payment created"
        );

        let request = InitializeRequest {
            reference: record.reference.clone(),
            amount: record.amount,
            currency: record.currency.clone(),
            email: record.payer_email.clone(),
            phone,
            method: record.payment_method,
            callback_url: self.config.callback_url.clone(),
            metadata: json!({
                "payer_id": record.payer_id,
                "rental_unit": record.rental_unit,
                "payment_type": record.payment_type.as_str(),
                "months_paid_for": record.months_paid_for,
            }),
        };

        match self.gateway.initialize(&request).await {
            Ok(initialized) => Ok(InitiatedPayment {
                record,
                prompt: initialized.prompt,
            }),
            Err(err @ Error::GatewayUnavailable(_)) => {
                warn!(
                    reference = %record.reference,
                    error = %err,
                    "gateway outcome unknown, payment left pending for verification"
                );
                Err(err)
            }
            Err(err) => {
                warn!(reference = %record.reference, error = %err, "gateway initialization failed");
                if let Err(mark_err) = self
                    .engine
                    .apply(
                        &record.reference,
                        PaymentOutcome::Failed,
                        ChargeDetails::default(),
                        ReconciliationSource::Initialization,
                    )
                    .await
                {
                    error!(
                        reference = %record.reference,
                        error = %mark_err,
                        "could not mark payment failed after gateway error"
                    );
                }
                Err(err)
            }
        }
    }

    /// Amount and currency for a new payment. Rent and deposits are priced from the
    /// unit; a payer-supplied amount must agree with that price.
    async fn price(
        &self,
        payload: &InitiatePaymentPayload,
        months_paid_for: Option<i32>,
    ) -> Result<(i64, String)> {
        let requested_currency = payload.currency.as_deref().map(str::to_ascii_uppercase);

        if payload.payment_type == PaymentType::Other {
            let amount = payload.amount.ok_or_else(|| {
                Error::BadRequest("amount is required for this payment type".to_string())
            })?;
            let currency =
                requested_currency.unwrap_or_else(|| self.config.default_currency.clone());
            return Ok((amount, currency));
        }

        let unit = self.unit(&payload.rental_unit).await?;
        // Only rent carries a month count.
        let amount = match months_paid_for {
            Some(months) => unit.rent_for(months),
            None => unit.deposit_amount(),
        };

        if let Some(currency) = requested_currency.filter(|c| *c != unit.currency) {
            return Err(Error::BadRequest(format!(
                "Unit {} is priced in {}, not {}",
                unit.unit_id, unit.currency, currency
            )));
        }
        if let Some(requested) = payload.amount.filter(|a| *a != amount) {
            return Err(Error::BadRequest(format!(
                "Amount {} does not match the {} due of {}",
                format_amount(requested, &unit.currency),
                payload.payment_type.as_str().replace('_', " "),
                format_amount(amount, &unit.currency)
            )));
        }
        Ok((amount, unit.currency))
    }

    async fn unit(&self, unit_id: &str) -> Result<RentalUnit> {
        self.store.get_unit(unit_id).await?.ok_or_else(|| {
            Error::BadRequest(format!("Rental unit {} has no rent configured", unit_id))
        })
    }

    /// Fallback path: asks the gateway for the outcome and reconciles it.
    pub async fn verify(&self, reference: &str) -> Result<PaymentRecord> {
        let record = self.require(reference).await?;
        if record.status.is_terminal() {
            return Ok(record);
        }

        let verified = self.gateway.verify(reference).await?;
        match verified.outcome {
            Some(outcome) => {
                let result = self
                    .engine
                    .apply(
                        reference,
                        outcome,
                        ChargeDetails {
                            transaction_id: verified.transaction_id,
                            amount: verified.amount,
                            currency: verified.currency,
                        },
                        ReconciliationSource::Verification,
                    )
                    .await?;
                Ok(result.into_record())
            }
            None => {
                info!(reference, gateway_status = %verified.gateway_status, "payment still in flight");
                Ok(record)
            }
        }
    }

    /// Verifies Pending payments older than `older_than`. Returns how many changed.
    pub async fn reconcile_stale(&self, older_than: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| Error::Internal(format!("invalid reconcile window: {}", e)))?;
        let stale = self
            .store
            .list_payments(&PaymentFilter {
                status: Some(PaymentStatus::Pending),
                created_before: Some(cutoff),
                limit: Some(STALE_BATCH_SIZE),
                ..Default::default()
            })
            .await?;

        let mut changed = 0;
        for record in stale {
            match self.verify(&record.reference).await {
                Ok(updated) if updated.status != record.status => changed += 1,
                Ok(_) => {}
                Err(err) if is_unknown_transaction(&err) => {
                    // Initialization never reached the processor.
                    info!(reference = %record.reference, "gateway has no such transaction, failing stale payment");
                    match self
                        .engine
                        .apply(
                            &record.reference,
                            PaymentOutcome::Failed,
                            ChargeDetails::default(),
                            ReconciliationSource::Verification,
                        )
                        .await
                    {
                        Ok(result) if result.is_applied() => changed += 1,
                        Ok(_) => {}
                        Err(err) => {
                            warn!(reference = %record.reference, error = %err, "could not fail stale payment");
                        }
                    }
                }
                Err(err) => {
                    warn!(reference = %record.reference, error = %err, "stale payment verification failed");
                }
            }
        }
        if changed > 0 {
            info!(changed, "reconciled stale payments");
        }
        Ok(changed)
    }

    pub async fn get(&self, reference: &str, viewer: &Viewer) -> Result<PaymentRecord> {
        let record = self.require(reference).await?;
        if !viewer.can_see(&record.payer_id) {
            return Err(Error::NotFound(format!("Payment {} not found", reference)));
        }
        Ok(record)
    }

    pub async fn verify_as(&self, reference: &str, viewer: &Viewer) -> Result<PaymentRecord> {
        self.get(reference, viewer).await?;
        self.verify(reference).await
    }

    pub async fn list(&self, mut filter: PaymentFilter, viewer: &Viewer) -> Result<PaymentPage> {
        if !viewer.role.sees_all_payments() {
            filter.payer_id = Some(viewer.user_id.clone());
        }
        let records = self.store.list_payments(&filter).await?;
        let summary = self.store.summarize_payments(&filter).await?;
        Ok(PaymentPage { records, summary })
    }

    pub async fn events(&self, reference: &str) -> Result<Vec<WebhookEvent>> {
        self.require(reference).await?;
        self.store.events_for(reference).await
    }

    pub async fn balance(&self, payer_id: &str, viewer: &Viewer) -> Result<Vec<TenantBalance>> {
        if !viewer.can_see(payer_id) {
            return Err(Error::Forbidden(
                "Cannot view another tenant's balance".to_string(),
            ));
        }
        self.store.balances_for(payer_id).await
    }

    /// Manual reconciliation by staff; still goes through the state machine.
    pub async fn update_status(
        &self,
        reference: &str,
        status: PaymentStatus,
        viewer: &Viewer,
    ) -> Result<PaymentRecord> {
        let result = self
            .engine
            .apply_status(
                reference,
                status,
                ChargeDetails::default(),
                ReconciliationSource::Operator {
                    user_id: viewer.user_id.clone(),
                },
            )
            .await?;
        match result {
            ReconciliationResult::Conflict(record) => Err(Error::InvalidTransition {
                reference: record.reference,
                from: record.status,
                to: status,
            }),
            other => Ok(other.into_record()),
        }
    }

    pub async fn set_unit_rent(
        &self,
        unit_id: &str,
        monthly_rent: i64,
        currency: Option<&str>,
        viewer: &Viewer,
    ) -> Result<RentalUnit> {
        let currency = currency
            .unwrap_or(&self.config.default_currency)
            .to_ascii_uppercase();
        let unit = self
            .store
            .upsert_unit(RentalUnit::new(unit_id, monthly_rent, currency))
            .await?;
        info!(
            unit = %unit.unit_id,
            monthly_rent = unit.monthly_rent,
            currency = %unit.currency,
            by = %viewer.user_id,
            "unit rent updated"
        );
        Ok(unit)
    }

    pub async fn get_unit(&self, unit_id: &str) -> Result<RentalUnit> {
        self.store
            .get_unit(unit_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Rental unit {} not found", unit_id)))
    }

    async fn require(&self, reference: &str) -> Result<PaymentRecord> {
        self.store
            .get_payment(reference)
            .await?
            .ok_or_else(|| Error::UnknownReference(reference.to_string()))
    }
}
