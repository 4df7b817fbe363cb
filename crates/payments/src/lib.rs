//! Payments service: owns payment records and mutates them only in response
//! to commands on the `payments-commands` channel, emitting one outcome event
//! per applied command via the transactional publisher.

pub mod service;
pub mod state;

pub use service::PaymentService;
pub use state::{PaymentRecord, PaymentStatus, PaymentsState};
