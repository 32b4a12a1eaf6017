pub mod gateway_service;
pub mod notification_service;
pub mod payment_service;
pub mod reconciliation_service;
