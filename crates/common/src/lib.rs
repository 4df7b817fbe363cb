//! Shared identifiers and value objects used across all services.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{CustomerId, EventId, OrderId, PaymentId, ProductId};
