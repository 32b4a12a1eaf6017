pub mod memory;
pub mod pool;
pub mod postgres;
pub mod store;

pub use memory::InMemoryPaymentStore;
pub use postgres::PgPaymentStore;
pub use store::{PaymentStore, Transition};
