pub mod payment_dto;
pub mod webhook_dto;
