use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use bytes::Bytes;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    dto::webhook_dto::PaystackEvent,
    error::{Error, Result},
    models::webhook_event::{WebhookOutcome, WebhookReceipt},
    services::reconciliation_service::{ReconciliationResult, ReconciliationSource},
    utils::signature::{payload_digest, verify_signature, SIGNATURE_HEADER},
    AppState,
};

/// Paystack event receiver. The signature is checked over the raw bytes before
/// anything is parsed, and every call leaves exactly one log entry.
///
/// Processing runs on its own task, so a request timeout only cuts the response
/// short: the reconciliation and its log entry still complete, and the
/// redelivery that follows is logged as a duplicate.
#[axum::debug_handler]
pub async fn handle_paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let status = tokio::spawn(process_webhook(state, provided, body))
        .await
        .map_err(|e| {
            error!(error = %e, "webhook processing task failed");
            Error::Internal("webhook processing failed".to_string())
        })??;
    Ok((StatusCode::OK, Json(json!({ "status": status }))))
}

async fn process_webhook(state: AppState, provided: String, body: Bytes) -> Result<&'static str> {
    let signature_valid =
        !provided.is_empty() && verify_signature(&state.config.webhook_secret, &body, &provided);
    let mut receipt = WebhookReceipt::new(payload_digest(&body), signature_valid);

    if !signature_valid {
        warn!(digest = %receipt.payload_digest, "webhook signature rejected");
        state
            .store
            .record_event(receipt.into_event(WebhookOutcome::Rejected))
            .await?;
        return Err(Error::SignatureInvalid);
    }

    let event: PaystackEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "malformed webhook body");
            state
                .store
                .record_event(receipt.into_event(WebhookOutcome::Malformed))
                .await?;
            return Err(Error::BadRequest("malformed_payload".to_string()));
        }
    };
    receipt.event_type = Some(event.event.clone());
    receipt.reference = event.reference();

    let Some(outcome) = event.outcome() else {
        info!(event = %event.event, "ignoring unsupported webhook event");
        state
            .store
            .record_event(receipt.into_event(WebhookOutcome::Ignored))
            .await?;
        return Ok("ignored");
    };

    let Some(reference) = receipt.reference.clone() else {
        warn!(event = %event.event, "webhook event without a payment reference");
        state
            .store
            .record_event(receipt.into_event(WebhookOutcome::Malformed))
            .await?;
        return Err(Error::BadRequest("missing_reference".to_string()));
    };

    let result = state
        .engine
        .apply(
            &reference,
            outcome,
            event.charge_details(),
            ReconciliationSource::Webhook(receipt),
        )
        .await;

    match result {
        Ok(ReconciliationResult::Applied(_)) => Ok("applied"),
        Ok(ReconciliationResult::AlreadyReconciled(_)) => Ok("duplicate"),
        // Redelivery cannot resolve a conflict; operators have been alerted.
        Ok(ReconciliationResult::Conflict(_)) => Ok("conflict"),
        Err(Error::UnknownReference(_)) => Ok("ignored"),
        Err(err) => Err(err),
    }
}
