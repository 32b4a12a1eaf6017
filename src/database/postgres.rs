use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::database::store::{balance_effect, PaymentStore, Transition};
use crate::error::Result;
use crate::models::balance::TenantBalance;
use crate::models::payment::{NewPayment, PaymentFilter, PaymentRecord, PaymentSummary};
use crate::models::unit::RentalUnit;
use crate::models::webhook_event::WebhookEvent;

const PAYMENT_COLUMNS: &str = "id, reference, amount, currency, payer_id, payer_email, \
    payer_phone, rental_unit, payment_type, payment_method, months_paid_for, status, \
    transaction_id, last_event_id, created_at, updated_at, processed_at";

const UNIT_COLUMNS: &str = "unit_id, monthly_rent, currency, updated_at";

const EVENT_COLUMNS: &str =
    "id, received_at, payload_digest, signature_valid, event_type, reference, outcome";

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &PaymentFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(payment_type) = filter.payment_type {
        qb.push(" AND payment_type = ").push_bind(payment_type.as_str());
    }
    if let Some(payer_id) = &filter.payer_id {
        qb.push(" AND payer_id = ").push_bind(payer_id.clone());
    }
    if let Some(before) = filter.created_before {
        qb.push(" AND created_at < ").push_bind(before);
    }
}

#[derive(Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_event<'c, E>(executor: E, event: &WebhookEvent) -> Result<WebhookEvent>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let sql = format!(
            r#"INSERT INTO webhook_events
                (id, received_at, payload_digest, signature_valid, event_type, reference, outcome)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {}"#,
            EVENT_COLUMNS
        );
        let row = sqlx::query_as::<_, WebhookEvent>(&sql)
            .bind(event.id)
            .bind(event.received_at)
            .bind(&event.payload_digest)
            .bind(event.signature_valid)
            .bind(&event.event_type)
            .bind(&event.reference)
            .bind(event.outcome.as_str())
            .fetch_one(executor)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert_payment(&self, payment: NewPayment) -> Result<PaymentRecord> {
        let sql = format!(
            r#"INSERT INTO payments (
                id, reference, amount, currency, payer_id, payer_email, payer_phone,
                rental_unit, payment_type, payment_method, months_paid_for, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending')
            RETURNING {}"#,
            PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(uuid::Uuid::new_v4())
            .bind(&payment.reference)
            .bind(payment.amount)
            .bind(&payment.currency)
            .bind(&payment.payer_id)
            .bind(&payment.payer_email)
            .bind(&payment.payer_phone)
            .bind(&payment.rental_unit)
            .bind(payment.payment_type.as_str())
            .bind(payment.payment_method.as_str())
            .bind(payment.months_paid_for)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_payment(&self, reference: &str) -> Result<Option<PaymentRecord>> {
        let sql = format!("SELECT {} FROM payments WHERE reference = $1", PAYMENT_COLUMNS);
        let row = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<PaymentRecord>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM payments WHERE TRUE", PAYMENT_COLUMNS));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(offset.max(0));
        }

        let rows = qb
            .build_query_as::<PaymentRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn summarize_payments(&self, filter: &PaymentFilter) -> Result<PaymentSummary> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"SELECT COUNT(*) AS total,
                      COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                      COALESCE(SUM(amount) FILTER (WHERE status = 'completed'), 0)::BIGINT
                          AS completed_amount
               FROM payments WHERE TRUE"#,
        );
        push_filters(&mut qb, filter);

        let summary = qb
            .build_query_as::<PaymentSummary>()
            .fetch_one(&self.pool)
            .await?;
        Ok(summary)
    }

    async fn transition(&self, transition: Transition) -> Result<Option<PaymentRecord>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"UPDATE payments
               SET status = $3,
                   transaction_id = COALESCE($4, transaction_id),
                   last_event_id = COALESCE($5, last_event_id),
                   processed_at = NOW(),
                   updated_at = NOW()
               WHERE reference = $1 AND status = $2
               RETURNING {}"#,
            PAYMENT_COLUMNS
        );
        let updated = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(&transition.reference)
            .bind(transition.from.as_str())
            .bind(transition.to.as_str())
            .bind(&transition.transaction_id)
            .bind(transition.event.as_ref().map(|e| e.id))
            .fetch_optional(&mut *tx)
            .await?;

        let Some(record) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        let unit_sql = format!("SELECT {} FROM rental_units WHERE unit_id = $1", UNIT_COLUMNS);
        let unit = sqlx::query_as::<_, RentalUnit>(&unit_sql)
            .bind(&record.rental_unit)
            .fetch_optional(&mut *tx)
            .await?;
        let required_deposit = unit.as_ref().map(RentalUnit::deposit_amount);

        if let Some(effect) = balance_effect(&record, transition.to, required_deposit) {
            sqlx::query(
                r#"INSERT INTO tenant_balances
                       (payer_id, rental_unit, currency, total_paid, deposit_paid, updated_at)
                   VALUES ($1, $2, $3, $4, COALESCE($5, FALSE), NOW())
                   ON CONFLICT (payer_id, rental_unit, currency) DO UPDATE
                   SET total_paid = tenant_balances.total_paid + EXCLUDED.total_paid,
                       deposit_paid = COALESCE($5, tenant_balances.deposit_paid),
                       updated_at = NOW()"#,
            )
            .bind(&record.payer_id)
            .bind(&record.rental_unit)
            .bind(&record.currency)
            .bind(effect.delta)
            .bind(effect.deposit_paid)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(event) = &transition.event {
            Self::insert_event(&mut *tx, event).await?;
        }

        tx.commit().await?;
        Ok(Some(record))
    }

    async fn record_event(&self, event: WebhookEvent) -> Result<WebhookEvent> {
        Self::insert_event(&self.pool, &event).await
    }

    async fn events_for(&self, reference: &str) -> Result<Vec<WebhookEvent>> {
        let sql = format!(
            "SELECT {} FROM webhook_events WHERE reference = $1 ORDER BY received_at ASC",
            EVENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, WebhookEvent>(&sql)
            .bind(reference)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn balances_for(&self, payer_id: &str) -> Result<Vec<TenantBalance>> {
        let rows = sqlx::query_as::<_, TenantBalance>(
            r#"SELECT payer_id, rental_unit, currency, total_paid, deposit_paid, updated_at
               FROM tenant_balances WHERE payer_id = $1 ORDER BY rental_unit"#,
        )
        .bind(payer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn deposit_paid(&self, payer_id: &str, rental_unit: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"SELECT COALESCE(BOOL_OR(deposit_paid), FALSE) AS paid
               FROM tenant_balances WHERE payer_id = $1 AND rental_unit = $2"#,
        )
        .bind(payer_id)
        .bind(rental_unit)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("paid")?)
    }

    async fn upsert_unit(&self, unit: RentalUnit) -> Result<RentalUnit> {
        let sql = format!(
            r#"INSERT INTO rental_units (unit_id, monthly_rent, currency, updated_at)
               VALUES ($1, $2, $3, NOW())
               ON CONFLICT (unit_id) DO UPDATE
               SET monthly_rent = EXCLUDED.monthly_rent,
                   currency = EXCLUDED.currency,
                   updated_at = NOW()
               RETURNING {}"#,
            UNIT_COLUMNS
        );
        let row = sqlx::query_as::<_, RentalUnit>(&sql)
            .bind(&unit.unit_id)
            .bind(unit.monthly_rent)
            .bind(&unit.currency)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_unit(&self, unit_id: &str) -> Result<Option<RentalUnit>> {
        let sql = format!("SELECT {} FROM rental_units WHERE unit_id = $1", UNIT_COLUMNS);
        let row = sqlx::query_as::<_, RentalUnit>(&sql)
            .bind(unit_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
