use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use validator::Validate;

use crate::{
    dto::payment_dto::{
        BalanceResponse, InitiatePaymentPayload, InitiatePaymentResponse, PaymentListQuery,
        PaymentListResponse, PaymentResponse, UnitRentPayload, UnitResponse, UpdateStatusPayload,
    },
    error::{Error, Result},
    models::payment::{PaymentFilter, PaymentStatus, PaymentType},
    services::payment_service::Viewer,
    AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 500;

#[axum::debug_handler]
pub async fn initiate_payment(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Json(payload): Json<InitiatePaymentPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let initiated = state
        .payment_service
        .initialize(&viewer.user_id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(InitiatePaymentResponse {
            payment: PaymentResponse::from(initiated.record),
            prompt: initiated.prompt,
        }),
    ))
}

#[axum::debug_handler]
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<PaymentListQuery>,
) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = query.page.unwrap_or(1).max(1);
    let filter = PaymentFilter {
        status: parse_param::<PaymentStatus>(query.status.as_deref())?,
        payment_type: parse_param::<PaymentType>(query.payment_type.as_deref())?,
        payer_id: query.payer_id,
        created_before: None,
        limit: Some(limit),
        offset: Some((page - 1).saturating_mul(limit)),
    };
    let listed = state.payment_service.list(filter, &viewer).await?;

    Ok(Json(PaymentListResponse {
        items: listed.records.into_iter().map(PaymentResponse::from).collect(),
        page,
        limit,
        summary: listed.summary,
    }))
}

#[axum::debug_handler]
pub async fn get_payment(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse> {
    let record = state.payment_service.get(&reference, &viewer).await?;
    Ok(Json(PaymentResponse::from(record)))
}

/// Asks the gateway for the outcome when the webhook is late or lost.
#[axum::debug_handler]
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse> {
    let record = state.payment_service.verify_as(&reference, &viewer).await?;
    Ok(Json(PaymentResponse::from(record)))
}

#[axum::debug_handler]
pub async fn update_payment_status(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(reference): Path<String>,
    Json(payload): Json<UpdateStatusPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let status: PaymentStatus = payload.status.parse().map_err(Error::BadRequest)?;
    let record = state
        .payment_service
        .update_status(&reference, status, &viewer)
        .await?;
    Ok(Json(PaymentResponse::from(record)))
}

#[axum::debug_handler]
pub async fn list_payment_events(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse> {
    let events = state.payment_service.events(&reference).await?;
    Ok(Json(events))
}

#[axum::debug_handler]
pub async fn tenant_balance(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(payer_id): Path<String>,
) -> Result<impl IntoResponse> {
    let balances = state.payment_service.balance(&payer_id, &viewer).await?;
    Ok(Json(BalanceResponse { payer_id, balances }))
}

#[axum::debug_handler]
pub async fn set_unit_rent(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(unit_id): Path<String>,
    Json(payload): Json<UnitRentPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let unit = state
        .payment_service
        .set_unit_rent(&unit_id, payload.monthly_rent, payload.currency.as_deref(), &viewer)
        .await?;
    Ok(Json(UnitResponse::from(unit)))
}

#[axum::debug_handler]
pub async fn get_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<String>,
) -> Result<impl IntoResponse> {
    let unit = state.payment_service.get_unit(&unit_id).await?;
    Ok(Json(UnitResponse::from(unit)))
}

fn parse_param<T>(raw: Option<&str>) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = String>,
{
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().parse::<T>().map_err(Error::BadRequest))
        .transpose()
}
