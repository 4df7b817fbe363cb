//! Orders service error types.

use common::{Money, OrderId};
use storage::StoreError;
use thiserror::Error;

/// Errors that can occur placing or querying orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Quantity must be a positive integer.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(u32),

    /// Unit price must be non-negative.
    #[error("invalid unit price: {0}")]
    InvalidPrice(Money),

    /// Order not found.
    #[error("order not found: {0}")]
    NotFound(OrderId),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
