//! Wire contracts between the saga services.
//!
//! Every message on the bus is one of a closed set of events and commands,
//! modeled as tagged unions with an explicit mapping between wire type names
//! and payload shapes. Decoding an unknown type or a malformed payload yields
//! a typed [`MessageError`], which consumers classify as poison.

pub mod commands;
pub mod error;
pub mod events;

pub use commands::{
    CancelProductReservation, PaymentCommand, ProcessPayment, ProductCommand, ReserveProduct,
};
pub use error::MessageError;
pub use events::{
    OrderCreated, OrderEvent, PaymentEvent, PaymentFailed, PaymentProcessed, ProductEvent,
    ProductReservationCanceled, ProductReservationFailed, ProductReserved,
};
