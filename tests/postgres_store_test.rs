//! Runs against a real Postgres only when `DATABASE_URL` is set; otherwise each
//! test returns early.

use rental_payments::database::{pool::create_pool, PaymentStore, PgPaymentStore, Transition};
use rental_payments::models::payment::{
    NewPayment, PaymentFilter, PaymentMethod, PaymentStatus, PaymentType,
};
use rental_payments::models::unit::RentalUnit;
use rental_payments::models::webhook_event::{WebhookOutcome, WebhookReceipt};
use uuid::Uuid;

async fn store() -> Option<PgPaymentStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = create_pool(&url).await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    Some(PgPaymentStore::new(pool))
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

fn payment(reference: &str, payer: &str, unit: &str, amount: i64, payment_type: PaymentType) -> NewPayment {
    NewPayment {
        reference: reference.to_string(),
        amount,
        currency: "KES".to_string(),
        payer_id: payer.to_string(),
        payer_email: "tenant@example.com".to_string(),
        payer_phone: Some("+254712345678".to_string()),
        rental_unit: unit.to_string(),
        payment_type,
        payment_method: PaymentMethod::Mpesa,
        months_paid_for: None,
    }
}

fn transition(reference: &str, from: PaymentStatus, to: PaymentStatus, digest: &str) -> Transition {
    let mut receipt = WebhookReceipt::new(digest.to_string(), true);
    receipt.event_type = Some("charge.success".to_string());
    receipt.reference = Some(reference.to_string());
    Transition {
        reference: reference.to_string(),
        from,
        to,
        transaction_id: Some("4099260516".to_string()),
        event: Some(receipt.into_event(WebhookOutcome::Applied)),
    }
}

#[tokio::test]
async fn conditional_update_applies_once_and_upserts_the_balance() {
    let Some(store) = store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let payer = unique("tenant");
    let unit = unique("unit");
    let reference = unique("PAY");

    store
        .upsert_unit(RentalUnit::new(&unit, 2_500_000, "KES"))
        .await
        .unwrap();
    let deposit = store
        .upsert_unit(RentalUnit::new(&unit, 2_000_000, "KES"))
        .await
        .unwrap()
        .deposit_amount();
    assert_eq!(store.get_unit(&unit).await.unwrap().unwrap().monthly_rent, 2_000_000);

    store
        .insert_payment(payment(&reference, &payer, &unit, deposit, PaymentType::SecurityDeposit))
        .await
        .unwrap();

    let stale = store
        .transition(transition(&reference, PaymentStatus::Failed, PaymentStatus::Completed, "d1"))
        .await
        .unwrap();
    assert!(stale.is_none());
    assert!(store.events_for(&reference).await.unwrap().is_empty());

    let applied = store
        .transition(transition(&reference, PaymentStatus::Pending, PaymentStatus::Completed, "d2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(applied.status, PaymentStatus::Completed);
    assert!(applied.processed_at.is_some());

    let again = store
        .transition(transition(&reference, PaymentStatus::Pending, PaymentStatus::Completed, "d3"))
        .await
        .unwrap();
    assert!(again.is_none());

    let events = store.events_for(&reference).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload_digest, "d2");

    let balances = store.balances_for(&payer).await.unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].total_paid, deposit);
    assert!(balances[0].deposit_paid);
    assert!(store.deposit_paid(&payer, &unit).await.unwrap());

    let refunded = store
        .transition(transition(&reference, PaymentStatus::Completed, PaymentStatus::Refunded, "d4"))
        .await
        .unwrap();
    assert!(refunded.is_some());
    let balances = store.balances_for(&payer).await.unwrap();
    assert_eq!(balances[0].total_paid, 0);
    assert!(!balances[0].deposit_paid);
}

#[tokio::test]
async fn short_deposit_is_counted_but_not_marked_paid() {
    let Some(store) = store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let payer = unique("tenant");
    let unit = unique("unit");
    let reference = unique("PAY");

    store
        .upsert_unit(RentalUnit::new(&unit, 1_000_000, "KES"))
        .await
        .unwrap();
    store
        .insert_payment(payment(&reference, &payer, &unit, 1_000_000, PaymentType::SecurityDeposit))
        .await
        .unwrap();
    store
        .transition(transition(&reference, PaymentStatus::Pending, PaymentStatus::Completed, "d1"))
        .await
        .unwrap()
        .unwrap();

    let balances = store.balances_for(&payer).await.unwrap();
    assert_eq!(balances[0].total_paid, 1_000_000);
    assert!(!balances[0].deposit_paid);
}

#[tokio::test]
async fn summary_spans_every_page() {
    let Some(store) = store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let payer = unique("tenant");
    let mut references = Vec::new();
    for _ in 0..3 {
        let reference = unique("PAY");
        store
            .insert_payment(payment(&reference, &payer, "unit-any", 500_000, PaymentType::Other))
            .await
            .unwrap();
        references.push(reference);
    }
    store
        .transition(transition(&references[0], PaymentStatus::Pending, PaymentStatus::Completed, "d1"))
        .await
        .unwrap()
        .unwrap();

    let filter = PaymentFilter {
        payer_id: Some(payer.clone()),
        limit: Some(1),
        offset: Some(2),
        ..Default::default()
    };
    let page = store.list_payments(&filter).await.unwrap();
    assert_eq!(page.len(), 1);

    let summary = store.summarize_payments(&filter).await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.pending, 2);
    assert_eq!(summary.completed_amount, 500_000);
}
