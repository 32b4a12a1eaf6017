use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rental_payments::{
    error::Error,
    models::payment::{PaymentMethod, PaymentOutcome},
    services::gateway_service::{
        InitializeRequest, PaymentGateway, PaymentPrompt, PaystackClient, RetryPolicy,
    },
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct FakePaystack {
    hits: Arc<AtomicUsize>,
}

async fn initialize(
    State(fake): State<FakePaystack>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    fake.hits.fetch_add(1, Ordering::SeqCst);
    assert_eq!(
        headers.get("authorization").and_then(|v| v.to_str().ok()),
        Some("Bearer sk_test_key")
    );
    assert_eq!(body["channels"], json!(["card"]));
    Json(json!({
        "status": true,
        "message": "Authorization URL created",
        "data": {
            "authorization_url": "https://checkout.paystack.com/0peioxfhpn",
            "access_code": "0peioxfhpn",
            "reference": body["reference"],
        }
    }))
}

async fn charge(State(fake): State<FakePaystack>, Json(body): Json<Value>) -> impl IntoResponse {
    fake.hits.fetch_add(1, Ordering::SeqCst);
    assert_eq!(body["mobile_money"]["provider"], "mpesa");
    assert_eq!(body["mobile_money"]["phone"], "+254712345678");
    Json(json!({
        "status": true,
        "message": "Charge attempted",
        "data": {
            "reference": body["reference"],
            "status": "pay_offline",
            "display_text": "Please complete authorization process on your mobile phone",
        }
    }))
}

async fn verify(State(fake): State<FakePaystack>, Path(reference): Path<String>) -> impl IntoResponse {
    fake.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "status": true,
        "message": "Verification successful",
        "data": {
            "id": 4099260516u64,
            "status": "success",
            "reference": reference,
            "amount": 500_000,
            "currency": "KES",
        }
    }))
}

async fn slow(State(fake): State<FakePaystack>) -> impl IntoResponse {
    fake.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(2)).await;
    StatusCode::OK
}

async fn bad_request(State(fake): State<FakePaystack>) -> impl IntoResponse {
    fake.hits.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": false, "message": "Invalid Email Address Passed" })),
    )
}

/// Times out on the first call, then answers like Paystack does for a reference it
/// already holds.
async fn slow_then_duplicate(State(fake): State<FakePaystack>) -> impl IntoResponse {
    let hit = fake.hits.fetch_add(1, Ordering::SeqCst);
    if hit == 0 {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": false, "message": "Duplicate Transaction Reference" })),
    )
}

async fn server_error(State(fake): State<FakePaystack>) -> impl IntoResponse {
    fake.hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::BAD_GATEWAY
}

async fn spawn_paystack(router: Router<FakePaystack>) -> (String, FakePaystack) {
    let fake = FakePaystack::default();
    let app = router.with_state(fake.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), fake)
}

fn client(base_url: &str) -> PaystackClient {
    PaystackClient::new(
        "sk_test_key".to_string(),
        base_url,
        Duration::from_millis(200),
        RetryPolicy::new(3, Duration::from_millis(10)),
    )
    .unwrap()
}

fn request(method: PaymentMethod) -> InitializeRequest {
    InitializeRequest {
        reference: "PAY-GATEWAY00001".to_string(),
        amount: 500_000,
        currency: "KES".to_string(),
        email: "wanjiru@example.com".to_string(),
        phone: Some("+254712345678".to_string()),
        method,
        callback_url: None,
        metadata: json!({ "rental_unit": "unit-4B" }),
    }
}

#[tokio::test]
async fn card_initialization_returns_redirect() {
    let (base, fake) =
        spawn_paystack(Router::new().route("/transaction/initialize", post(initialize))).await;

    let initialized = client(&base)
        .initialize(&request(PaymentMethod::Card))
        .await
        .unwrap();
    assert_eq!(initialized.reference, "PAY-GATEWAY00001");
    assert_eq!(
        initialized.prompt,
        PaymentPrompt::Redirect {
            authorization_url: "https://checkout.paystack.com/0peioxfhpn".to_string(),
            access_code: Some("0peioxfhpn".to_string()),
        }
    );
    assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mpesa_initialization_returns_mobile_prompt() {
    let (base, _fake) = spawn_paystack(Router::new().route("/charge", post(charge))).await;

    let initialized = client(&base)
        .initialize(&request(PaymentMethod::Mpesa))
        .await
        .unwrap();
    assert!(matches!(initialized.prompt, PaymentPrompt::MobilePrompt { .. }));
}

#[tokio::test]
async fn verify_maps_status_and_transaction_id() {
    let (base, _fake) = spawn_paystack(
        Router::new().route("/transaction/verify/:reference", get(verify)),
    )
    .await;

    let verified = client(&base).verify("PAY-GATEWAY00001").await.unwrap();
    assert_eq!(verified.reference, "PAY-GATEWAY00001");
    assert_eq!(verified.outcome, Some(PaymentOutcome::Success));
    assert_eq!(verified.transaction_id.as_deref(), Some("4099260516"));
    assert_eq!(verified.amount, Some(500_000));
}

#[tokio::test]
async fn timeouts_are_retried_then_unavailable() {
    let (base, fake) = spawn_paystack(Router::new().route("/charge", post(slow))).await;

    let result = client(&base).initialize(&request(PaymentMethod::Mpesa)).await;
    assert!(matches!(result, Err(Error::GatewayUnavailable(_))));
    assert_eq!(fake.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn server_errors_are_retried_then_unavailable() {
    let (base, fake) =
        spawn_paystack(Router::new().route("/transaction/initialize", post(server_error))).await;

    let result = client(&base).initialize(&request(PaymentMethod::Card)).await;
    assert!(matches!(result, Err(Error::GatewayUnavailable(_))));
    assert_eq!(fake.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let (base, fake) =
        spawn_paystack(Router::new().route("/transaction/initialize", post(bad_request))).await;

    let result = client(&base).initialize(&request(PaymentMethod::Card)).await;
    match result {
        Err(Error::GatewayRejected { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid Email Address Passed");
        }
        other => panic!("expected rejection, got {:?}", other.map(|i| i.reference)),
    }
    assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejection_after_a_timeout_is_not_definitive() {
    let (base, fake) =
        spawn_paystack(Router::new().route("/charge", post(slow_then_duplicate))).await;

    let result = client(&base).initialize(&request(PaymentMethod::Mpesa)).await;
    assert!(matches!(result, Err(Error::GatewayUnavailable(_))));
    assert_eq!(fake.hits.load(Ordering::SeqCst), 2);
}
