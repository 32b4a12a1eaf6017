pub mod health;
pub mod payments;
pub mod webhook;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::middleware::auth::{require_capability, CapabilityGuard};
use crate::models::role::Capability;
use crate::AppState;

const READ_PAYMENTS: &[Capability] = &[Capability::ViewOwnPayments, Capability::ViewAllPayments];

fn guarded(
    state: &AppState,
    any_of: &'static [Capability],
    routes: Router<AppState>,
) -> Router<AppState> {
    let guard = CapabilityGuard::new(&state.config.jwt_secret, any_of);
    routes.route_layer(middleware::from_fn_with_state(guard, require_capability))
}

/// Full HTTP surface. Each capability group gets its own guard; groups sharing a
/// path are merged per method.
pub fn app(state: AppState) -> Router {
    let base_routes = Router::new().route("/health", get(health::health));

    let webhook_api = Router::new()
        .route(
            "/api/webhooks/paystack",
            post(webhook::handle_paystack_webhook),
        )
        .route_layer(TimeoutLayer::new(state.config.webhook_timeout()));

    let initiate_api = guarded(
        &state,
        &[Capability::InitiatePayment],
        Router::new().route("/api/payments", post(payments::initiate_payment)),
    );

    let read_api = guarded(
        &state,
        READ_PAYMENTS,
        Router::new()
            .route("/api/payments", get(payments::list_payments))
            .route("/api/payments/:reference", get(payments::get_payment))
            .route(
                "/api/payments/:reference/verify",
                post(payments::verify_payment),
            )
            .route(
                "/api/tenants/:payer_id/balance",
                get(payments::tenant_balance),
            )
            .route("/api/units/:unit_id", get(payments::get_unit)),
    );

    let manage_api = guarded(
        &state,
        &[Capability::UpdatePaymentStatus],
        Router::new().route(
            "/api/payments/:reference/status",
            post(payments::update_payment_status),
        ),
    );

    let units_api = guarded(
        &state,
        &[Capability::ManageUnits],
        Router::new().route("/api/units/:unit_id", put(payments::set_unit_rent)),
    );

    let audit_api = guarded(
        &state,
        &[Capability::ViewWebhookEvents],
        Router::new().route(
            "/api/payments/:reference/events",
            get(payments::list_payment_events),
        ),
    );

    base_routes
        .merge(webhook_api)
        .merge(initiate_api)
        .merge(read_api)
        .merge(manage_api)
        .merge(units_api)
        .merge(audit_api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024))
}
