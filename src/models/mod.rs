pub mod balance;
pub mod payment;
pub mod role;
pub mod unit;
pub mod webhook_event;
