#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use rental_payments::{
    config::Config,
    database::InMemoryPaymentStore,
    error::{Error, Result},
    middleware::auth::Claims,
    models::{
        payment::{NewPayment, PaymentMethod, PaymentRecord, PaymentType},
        unit::RentalUnit,
    },
    routes,
    services::{
        gateway_service::{
            outcome_for_status, InitializeRequest, InitializedPayment, PaymentGateway,
            PaymentPrompt, VerifiedPayment,
        },
        notification_service::{NotificationService, PaymentNotification},
    },
    utils::signature::sign,
    AppState,
};
use serde_json::Value;
use tokio::sync::mpsc::Receiver;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test_jwt_secret";
pub const WEBHOOK_SECRET: &str = "sk_test_webhook_secret";

pub const UNIT: &str = "unit-4B";
pub const UNIT_RENT: i64 = 2_500_000;
/// 113% of `UNIT_RENT`.
pub const UNIT_DEPOSIT: i64 = 2_825_000;
pub const OTHER_AMOUNT: i64 = 500_000;

/// What a seeded payment of this type is charged.
pub fn amount_for(payment_type: PaymentType) -> i64 {
    match payment_type {
        PaymentType::Rent => UNIT_RENT,
        PaymentType::SecurityDeposit => UNIT_DEPOSIT,
        PaymentType::Other => OTHER_AMOUNT,
    }
}

pub fn test_config() -> Config {
    Config {
        server_address: "127.0.0.1:0".to_string(),
        database_url: None,
        jwt_secret: JWT_SECRET.to_string(),
        paystack_secret_key: "sk_test_key".to_string(),
        paystack_base_url: "http://127.0.0.1:9".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        callback_url: None,
        default_currency: "KES".to_string(),
        gateway_max_attempts: 3,
        gateway_backoff_ms: 10,
        gateway_timeout_secs: 1,
        webhook_timeout_ms: 5000,
        reconcile_after_secs: 900,
        reconcile_interval_secs: 60,
        notification_url: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitBehavior {
    Succeed,
    Unavailable,
    Rejected,
}

/// Scripted gateway: initialize follows `init`, verify reports `verify_status`.
/// A `verify_status` of `"not_found"` answers like Paystack does for a reference
/// it has never seen.
pub struct FakeGateway {
    pub init: Mutex<InitBehavior>,
    pub verify_status: Mutex<String>,
    pub initialize_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            init: Mutex::new(InitBehavior::Succeed),
            verify_status: Mutex::new("ongoing".to_string()),
            initialize_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_init(&self, behavior: InitBehavior) {
        *self.init.lock().unwrap() = behavior;
    }

    pub fn set_verify_status(&self, status: &str) {
        *self.verify_status.lock().unwrap() = status.to_string();
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize(&self, request: &InitializeRequest) -> Result<InitializedPayment> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.init.lock().unwrap();
        match behavior {
            InitBehavior::Succeed => Ok(InitializedPayment {
                reference: request.reference.clone(),
                prompt: match request.method {
                    PaymentMethod::Mpesa => PaymentPrompt::MobilePrompt {
                        display_text: "Enter your M-Pesa PIN".to_string(),
                    },
                    PaymentMethod::Card => PaymentPrompt::Redirect {
                        authorization_url: format!("https://checkout.test/{}", request.reference),
                        access_code: Some("ac_test".to_string()),
                    },
                },
            }),
            InitBehavior::Unavailable => Err(Error::GatewayUnavailable(
                "charge timed out".to_string(),
            )),
            InitBehavior::Rejected => Err(Error::GatewayRejected {
                status: 400,
                message: "Invalid email".to_string(),
            }),
        }
    }

    async fn verify(&self, reference: &str) -> Result<VerifiedPayment> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let status = self.verify_status.lock().unwrap().clone();
        if status == "not_found" {
            return Err(Error::GatewayRejected {
                status: 400,
                message: "Transaction reference not found".to_string(),
            });
        }
        Ok(VerifiedPayment {
            reference: reference.to_string(),
            outcome: outcome_for_status(&status),
            gateway_status: status,
            transaction_id: Some("4099260516".to_string()),
            amount: None,
            currency: None,
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: InMemoryPaymentStore,
    pub gateway: Arc<FakeGateway>,
    pub notifications: Receiver<PaymentNotification>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = InMemoryPaymentStore::with_units([RentalUnit::new(UNIT, UNIT_RENT, "KES")]);
        let gateway = Arc::new(FakeGateway::new());
        let (notifier, notifications) = NotificationService::channel(64);
        let state = AppState::new(
            Arc::new(config),
            Arc::new(store.clone()),
            gateway.clone(),
            notifier,
        );
        Self {
            router: routes::app(state.clone()),
            state,
            store,
            gateway,
            notifications,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Inserts a Pending record directly, bypassing the gateway. Amounts follow
    /// [`amount_for`].
    pub async fn seed_payment(&self, reference: &str, payer_id: &str, payment_type: PaymentType) -> PaymentRecord {
        use rental_payments::database::PaymentStore;
        self.store
            .insert_payment(NewPayment {
                reference: reference.to_string(),
                amount: amount_for(payment_type),
                currency: "KES".to_string(),
                payer_id: payer_id.to_string(),
                payer_email: format!("{}@example.com", payer_id),
                payer_phone: Some("+254712345678".to_string()),
                rental_unit: UNIT.to_string(),
                payment_type,
                payment_method: PaymentMethod::Mpesa,
                months_paid_for: if payment_type == PaymentType::Rent { Some(1) } else { None },
            })
            .await
            .unwrap()
    }
}

pub fn token(sub: &str, role: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        role: role.to_string(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn authed(method: &str, uri: &str, bearer: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", bearer));
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// A signed Paystack charge event carrying amount and currency.
pub fn charge_event(event: &str, reference: &str, amount: i64) -> String {
    serde_json::json!({
        "event": event,
        "data": {
            "id": 4099260516u64,
            "reference": reference,
            "status": if event == "charge.success" { "success" } else { "failed" },
            "amount": amount,
            "currency": "KES",
        }
    })
    .to_string()
}

pub fn signed_webhook(body: &str) -> Request<Body> {
    let signature = sign(WEBHOOK_SECRET, body.as_bytes()).unwrap();
    webhook_with_signature(body, Some(&signature))
}

pub fn webhook_with_signature(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhooks/paystack")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-paystack-signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn json_body(resp: Response) -> (StatusCode, Value) {
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
