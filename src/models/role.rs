use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    PropertyManager,
    Landlord,
    Tenant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    InitiatePayment,
    ViewOwnPayments,
    ViewAllPayments,
    UpdatePaymentStatus,
    ViewWebhookEvents,
    ManageUnits,
}

impl Role {
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Admin => &[
                ViewAllPayments,
                UpdatePaymentStatus,
                ViewWebhookEvents,
                ManageUnits,
            ],
            Role::PropertyManager => &[ViewAllPayments, UpdatePaymentStatus, ManageUnits],
            Role::Landlord => &[ViewAllPayments, ManageUnits],
            Role::Tenant => &[InitiatePayment, ViewOwnPayments],
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Whether this role may read any payer's records, not only its own.
    pub fn sees_all_payments(&self) -> bool {
        self.has(Capability::ViewAllPayments)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "PROPERTY_MANAGER" => Ok(Role::PropertyManager),
            "LANDLORD" => Ok(Role::Landlord),
            "TENANT" => Ok(Role::Tenant),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}
