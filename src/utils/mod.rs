pub mod phone;
pub mod reference;
pub mod signature;
