use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::database::store::{balance_effect, PaymentStore, Transition};
use crate::error::{Error, Result};
use crate::models::balance::TenantBalance;
use crate::models::payment::{NewPayment, PaymentFilter, PaymentRecord, PaymentSummary};
use crate::models::unit::RentalUnit;
use crate::models::webhook_event::WebhookEvent;

type BalanceKey = (String, String, String);

#[derive(Default)]
struct State {
    payments: HashMap<String, PaymentRecord>,
    events: Vec<WebhookEvent>,
    balances: HashMap<BalanceKey, TenantBalance>,
    units: HashMap<String, RentalUnit>,
}

/// A thread-safe in-memory payment store.
///
/// Every operation takes the single `RwLock`, so a `transition` together with its
/// balance update and event insert is atomic. Used by tests and by runs without
/// `DATABASE_URL`.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with unit pricing already in place.
    pub fn with_units(units: impl IntoIterator<Item = RentalUnit>) -> Self {
        let state = State {
            units: units
                .into_iter()
                .map(|unit| (unit.unit_id.clone(), unit))
                .collect(),
            ..State::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Total number of webhook log entries, across all references.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    pub async fn all_events(&self) -> Vec<WebhookEvent> {
        self.state.read().await.events.clone()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_payment(&self, payment: NewPayment) -> Result<PaymentRecord> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&payment.reference) {
            return Err(Error::Internal(format!(
                "duplicate payment reference {}",
                payment.reference
            )));
        }
        let record = payment.into_record(Utc::now());
        state
            .payments
            .insert(record.reference.clone(), record.clone());
        Ok(record)
    }

    async fn get_payment(&self, reference: &str) -> Result<Option<PaymentRecord>> {
        let state = self.state.read().await;
        Ok(state.payments.get(reference).cloned())
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<PaymentRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<PaymentRecord> = state
            .payments
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    async fn summarize_payments(&self, filter: &PaymentFilter) -> Result<PaymentSummary> {
        let state = self.state.read().await;
        let mut summary = PaymentSummary::default();
        for record in state.payments.values().filter(|r| filter.matches(r)) {
            summary.add(record);
        }
        Ok(summary)
    }

    async fn transition(&self, transition: Transition) -> Result<Option<PaymentRecord>> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let record = match state.payments.get_mut(&transition.reference) {
            Some(record) if record.status == transition.from => {
                record.status = transition.to;
                if transition.transaction_id.is_some() {
                    record.transaction_id = transition.transaction_id.clone();
                }
                if let Some(event) = &transition.event {
                    record.last_event_id = Some(event.id);
                }
                record.processed_at = Some(now);
                record.updated_at = now;
                record.clone()
            }
            _ => return Ok(None),
        };

        let required_deposit = state
            .units
            .get(&record.rental_unit)
            .map(RentalUnit::deposit_amount);
        if let Some(effect) = balance_effect(&record, transition.to, required_deposit) {
            let key = (
                record.payer_id.clone(),
                record.rental_unit.clone(),
                record.currency.clone(),
            );
            let balance = state
                .balances
                .entry(key)
                .or_insert_with(|| TenantBalance {
                    payer_id: record.payer_id.clone(),
                    rental_unit: record.rental_unit.clone(),
                    currency: record.currency.clone(),
                    total_paid: 0,
                    deposit_paid: false,
                    updated_at: now,
                });
            balance.total_paid += effect.delta;
            if let Some(paid) = effect.deposit_paid {
                balance.deposit_paid = paid;
            }
            balance.updated_at = now;
        }

        if let Some(event) = transition.event {
            state.events.push(event);
        }

        Ok(Some(record))
    }

    async fn record_event(&self, event: WebhookEvent) -> Result<WebhookEvent> {
        let mut state = self.state.write().await;
        state.events.push(event.clone());
        Ok(event)
    }

    async fn events_for(&self, reference: &str) -> Result<Vec<WebhookEvent>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.reference.as_deref() == Some(reference))
            .cloned()
            .collect())
    }

    async fn balances_for(&self, payer_id: &str) -> Result<Vec<TenantBalance>> {
        let state = self.state.read().await;
        let mut balances: Vec<TenantBalance> = state
            .balances
            .values()
            .filter(|b| b.payer_id == payer_id)
            .cloned()
            .collect();
        balances.sort_by(|a, b| a.rental_unit.cmp(&b.rental_unit));
        Ok(balances)
    }

    async fn deposit_paid(&self, payer_id: &str, rental_unit: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .balances
            .values()
            .any(|b| b.payer_id == payer_id && b.rental_unit == rental_unit && b.deposit_paid))
    }

    async fn upsert_unit(&self, mut unit: RentalUnit) -> Result<RentalUnit> {
        let mut state = self.state.write().await;
        unit.updated_at = Utc::now();
        state.units.insert(unit.unit_id.clone(), unit.clone());
        Ok(unit)
    }

    async fn get_unit(&self, unit_id: &str) -> Result<Option<RentalUnit>> {
        let state = self.state.read().await;
        Ok(state.units.get(unit_id).cloned())
    }
}
