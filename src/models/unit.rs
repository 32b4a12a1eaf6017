use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Security deposit, as a percentage of one month's rent.
pub const DEPOSIT_PERCENT: i64 = 113;

/// Trusted pricing for a rental unit. Rent and deposit amounts are derived from
/// this, never taken from the payer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RentalUnit {
    pub unit_id: String,
    /// Minor currency units.
    pub monthly_rent: i64,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

impl RentalUnit {
    pub fn new(unit_id: impl Into<String>, monthly_rent: i64, currency: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            monthly_rent,
            currency: currency.into(),
            updated_at: Utc::now(),
        }
    }

    /// Rounded to the nearest minor unit.
    pub fn deposit_amount(&self) -> i64 {
        (self.monthly_rent * DEPOSIT_PERCENT + 50) / 100
    }

    pub fn rent_for(&self, months: i32) -> i64 {
        self.monthly_rent * i64::from(months)
    }
}
