//! Inventory service: owns per-product stock records and mutates them only
//! in response to commands on the `products-commands` channel, emitting one
//! outcome event per applied command via the transactional publisher.

pub mod service;
pub mod state;

pub use service::InventoryService;
pub use state::{InventoryRecord, InventoryState, ReservationError};
