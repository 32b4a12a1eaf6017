use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::payment::{PaymentMethod, PaymentOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct InitializeRequest {
    pub reference: String,
    pub amount: i64,
    pub currency: String,
    pub email: String,
    pub phone: Option<String>,
    pub method: PaymentMethod,
    pub callback_url: Option<String>,
    pub metadata: JsonValue,
}

/// What the payer has to do next to finish paying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentPrompt {
    Redirect {
        authorization_url: String,
        access_code: Option<String>,
    },
    MobilePrompt {
        display_text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializedPayment {
    pub reference: String,
    pub prompt: PaymentPrompt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub reference: String,
    /// `None` while the processor still considers the payment in flight.
    pub outcome: Option<PaymentOutcome>,
    pub gateway_status: String,
    pub transaction_id: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: &InitializeRequest) -> Result<InitializedPayment>;
    async fn verify(&self, reference: &str) -> Result<VerifiedPayment>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the given failed attempt (1-based): base, 2x base, 4x base...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: Option<String>,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    reference: String,
    status: String,
    display_text: Option<String>,
    gateway_response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    id: Option<JsonValue>,
    status: String,
    reference: String,
    amount: Option<i64>,
    currency: Option<String>,
}

/// Paystack REST client. Transient failures are retried per [`RetryPolicy`];
/// definitive 4xx answers are surfaced immediately as `GatewayRejected`.
///
/// A 4xx that follows a timed-out or 5xx attempt is reported as
/// `GatewayUnavailable`: the earlier attempt may have been accepted (Paystack
/// answers a repeated reference with "Duplicate Transaction Reference").
#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    base_url: Url,
    secret_key: String,
    retry: RetryPolicy,
}

impl PaystackClient {
    pub fn new(
        secret_key: String,
        base_url: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid Paystack base URL: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            secret_key,
            retry,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.paystack_secret_key.clone(),
            &config.paystack_base_url,
            config.gateway_timeout(),
            RetryPolicy::new(config.gateway_max_attempts, config.gateway_backoff()),
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config("Paystack base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_with_retry<T, F>(&self, operation: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = String::new();
        let mut maybe_accepted = false;

        for attempt in 1..=self.retry.max_attempts {
            match build().bearer_auth(&self.secret_key).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();

                    if status.is_success() {
                        return parse_envelope(operation, status, &body);
                    }
                    if is_definitive_rejection(status) {
                        let message = rejection_message(&body, status);
                        if maybe_accepted {
                            warn!(
                                operation,
                                status = status.as_u16(),
                                %message,
                                "Paystack rejected a retry of a request it may have accepted"
                            );
                            return Err(Error::GatewayUnavailable(format!(
                                "{} outcome unknown after retry: {}",
                                operation, message
                            )));
                        }
                        warn!(operation, status = status.as_u16(), %message, "Paystack rejected request");
                        return Err(Error::GatewayRejected {
                            status: status.as_u16(),
                            message,
                        });
                    }
                    maybe_accepted |= status != StatusCode::TOO_MANY_REQUESTS;
                    last_error = format!("{} returned HTTP {}", operation, status.as_u16());
                }
                Err(err) if err.is_timeout() => {
                    maybe_accepted = true;
                    last_error = format!("{} timed out", operation);
                }
                Err(err) => {
                    last_error = format!("{} failed: {}", operation, err);
                }
            }

            if attempt < self.retry.max_attempts {
                let delay = self.retry.delay_after(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Paystack call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!(operation, attempts = self.retry.max_attempts, error = %last_error, "Paystack unavailable");
        Err(Error::GatewayUnavailable(last_error))
    }

    async fn initialize_card(&self, request: &InitializeRequest) -> Result<InitializedPayment> {
        let url = self.endpoint(&["transaction", "initialize"])?;
        let mut body = json!({
            "email": request.email,
            "amount": request.amount,
            "currency": request.currency,
            "reference": request.reference,
            "channels": ["card"],
            "metadata": request.metadata,
        });
        if let Some(callback) = &request.callback_url {
            body["callback_url"] = json!(callback);
        }

        let data: InitializeData = self
            .send_with_retry("transaction.initialize", || {
                self.client.post(url.clone()).json(&body)
            })
            .await?;

        Ok(InitializedPayment {
            reference: data.reference,
            prompt: PaymentPrompt::Redirect {
                authorization_url: data.authorization_url,
                access_code: data.access_code,
            },
        })
    }

    async fn initialize_mpesa(&self, request: &InitializeRequest) -> Result<InitializedPayment> {
        let phone = request
            .phone
            .as_deref()
            .ok_or_else(|| Error::BadRequest("M-Pesa payments need a phone number".to_string()))?;
        let url = self.endpoint(&["charge"])?;
        let body = json!({
            "email": request.email,
            "amount": request.amount,
            "currency": request.currency,
            "reference": request.reference,
            "mobile_money": { "phone": phone, "provider": "mpesa" },
            "metadata": request.metadata,
        });

        let data: ChargeData = self
            .send_with_retry("charge", || self.client.post(url.clone()).json(&body))
            .await?;

        if data.status == "failed" {
            return Err(Error::GatewayRejected {
                status: StatusCode::PAYMENT_REQUIRED.as_u16(),
                message: data
                    .gateway_response
                    .unwrap_or_else(|| "M-Pesa charge was declined".to_string()),
            });
        }

        Ok(InitializedPayment {
            reference: data.reference,
            prompt: PaymentPrompt::MobilePrompt {
                display_text: data.display_text.unwrap_or_else(|| {
                    "Check your phone and enter your M-Pesa PIN to complete the payment"
                        .to_string()
                }),
            },
        })
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(&self, request: &InitializeRequest) -> Result<InitializedPayment> {
        debug!(reference = %request.reference, method = request.method.as_str(), "initializing payment");
        match request.method {
            PaymentMethod::Card => self.initialize_card(request).await,
            PaymentMethod::Mpesa => self.initialize_mpesa(request).await,
        }
    }

    async fn verify(&self, reference: &str) -> Result<VerifiedPayment> {
        let url = self.endpoint(&["transaction", "verify", reference])?;
        let data: VerifyData = self
            .send_with_retry("transaction.verify", || self.client.get(url.clone()))
            .await?;

        Ok(VerifiedPayment {
            outcome: outcome_for_status(&data.status),
            transaction_id: data.id.as_ref().and_then(json_id),
            reference: data.reference,
            gateway_status: data.status,
            amount: data.amount,
            currency: data.currency,
        })
    }
}

/// Maps a Paystack transaction status onto a terminal outcome, if it is one.
pub fn outcome_for_status(status: &str) -> Option<PaymentOutcome> {
    match status {
        "success" => Some(PaymentOutcome::Success),
        "failed" | "abandoned" | "reversed" => Some(PaymentOutcome::Failed),
        _ => None,
    }
}

/// Paystack sends ids as numbers; some payloads carry them as strings.
pub fn json_id(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Whether `err` is Paystack saying it has never seen the reference.
pub fn is_unknown_transaction(err: &Error) -> bool {
    match err {
        Error::GatewayRejected { status, message } => {
            *status == StatusCode::NOT_FOUND.as_u16()
                || message.to_ascii_lowercase().contains("not found")
        }
        _ => false,
    }
}

fn is_definitive_rejection(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}

fn rejection_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("Paystack returned HTTP {}", status.as_u16()))
}

fn parse_envelope<T: DeserializeOwned>(operation: &str, status: StatusCode, body: &str) -> Result<T> {
    let envelope: PaystackEnvelope<T> = serde_json::from_str(body).map_err(|e| {
        Error::Internal(format!("{} returned an unreadable response: {}", operation, e))
    })?;
    if !envelope.status {
        return Err(Error::GatewayRejected {
            status: status.as_u16(),
            message: envelope.message,
        });
    }
    envelope
        .data
        .ok_or_else(|| Error::Internal(format!("{} response carried no data", operation)))
}
