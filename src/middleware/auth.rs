use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::models::role::{Capability, Role};
use crate::services::payment_service::Viewer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: String,
}

/// Router-level guard: the caller needs at least one of `any_of`.
#[derive(Clone)]
pub struct CapabilityGuard {
    jwt_secret: Arc<str>,
    any_of: &'static [Capability],
}

impl CapabilityGuard {
    pub fn new(jwt_secret: &str, any_of: &'static [Capability]) -> Self {
        Self {
            jwt_secret: Arc::from(jwt_secret),
            any_of,
        }
    }

    fn authenticate(&self, req: &Request) -> std::result::Result<Viewer, &'static str> {
        let header = req
            .headers()
            .get(axum::http::header::AUTHORIZATION)
            .ok_or("missing_authorization")?;
        let value = header.to_str().map_err(|_| "bad_authorization")?;
        let token = value.strip_prefix("Bearer ").ok_or("unsupported_scheme")?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            debug!(error = %e, "rejected bearer token");
            "invalid_token"
        })?;

        let role: Role = data.claims.role.parse().map_err(|_| "unknown_role")?;
        Ok(Viewer {
            user_id: data.claims.sub,
            role,
        })
    }
}

pub async fn require_capability(
    State(guard): State<CapabilityGuard>,
    mut req: Request,
    next: Next,
) -> Response {
    let viewer = match guard.authenticate(&req) {
        Ok(viewer) => viewer,
        Err(code) => {
            return (StatusCode::UNAUTHORIZED, Json(json!({ "error": code }))).into_response();
        }
    };

    if !guard.any_of.iter().any(|c| viewer.role.has(*c)) {
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "forbidden" }))).into_response();
    }

    req.extensions_mut().insert(viewer);
    next.run(req).await
}
