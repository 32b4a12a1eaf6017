use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TenantBalance {
    pub payer_id: String,
    pub rental_unit: String,
    pub currency: String,
    pub total_paid: i64,
    pub deposit_paid: bool,
    pub updated_at: DateTime<Utc>,
}
