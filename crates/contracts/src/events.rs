//! Domain events published by the state-holding services.
//!
//! Each event is a fact: the owning service already committed the state
//! change the event describes before the envelope ever reached the bus.

use common::{CustomerId, Money, OrderId, PaymentId, ProductId};
use messaging::{Envelope, topics};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::MessageError;

pub(crate) fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, MessageError> {
    serde_json::from_value(envelope.payload.clone()).map_err(|source| MessageError::Malformed {
        event_type: envelope.event_type().to_string(),
        source,
    })
}

pub(crate) fn encode(
    topic: &str,
    order_id: OrderId,
    event_type: &str,
    payload: &impl Serialize,
) -> Result<Envelope, serde_json::Error> {
    Ok(Envelope::new(
        topic,
        order_id.to_string(),
        event_type,
        serde_json::to_value(payload)?,
    ))
}

/// An order was accepted and persisted with status CREATED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Events on the `orders-events` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    Created(OrderCreated),
}

impl OrderEvent {
    /// Wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "OrderCreated",
        }
    }

    /// The order this event belongs to.
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::Created(data) => data.order_id,
        }
    }

    /// Wraps the event into a bus envelope keyed by its order id.
    pub fn into_envelope(self) -> Result<Envelope, serde_json::Error> {
        let (order_id, event_type) = (self.order_id(), self.event_type());
        match &self {
            OrderEvent::Created(data) => encode(topics::ORDERS_EVENTS, order_id, event_type, data),
        }
    }

    /// Decodes an envelope from the `orders-events` channel.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, MessageError> {
        match envelope.event_type() {
            "OrderCreated" => Ok(OrderEvent::Created(decode(envelope)?)),
            other => Err(MessageError::UnknownType {
                topic: envelope.topic.clone(),
                event_type: other.to_string(),
            }),
        }
    }
}

/// Stock was moved from available to reserved for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductReserved {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A reservation could not be made; carries the business reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductReservationFailed {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub reason: String,
}

/// A reservation was reversed: the exact reserve delta was undone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductReservationCanceled {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Events on the `products-events` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProductEvent {
    Reserved(ProductReserved),
    ReservationFailed(ProductReservationFailed),
    ReservationCanceled(ProductReservationCanceled),
}

impl ProductEvent {
    /// Wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::Reserved(_) => "ProductReserved",
            ProductEvent::ReservationFailed(_) => "ProductReservationFailed",
            ProductEvent::ReservationCanceled(_) => "ProductReservationCanceled",
        }
    }

    /// The order this event belongs to.
    pub fn order_id(&self) -> OrderId {
        match self {
            ProductEvent::Reserved(data) => data.order_id,
            ProductEvent::ReservationFailed(data) => data.order_id,
            ProductEvent::ReservationCanceled(data) => data.order_id,
        }
    }

    /// Wraps the event into a bus envelope keyed by its order id.
    pub fn into_envelope(self) -> Result<Envelope, serde_json::Error> {
        let (order_id, event_type) = (self.order_id(), self.event_type());
        match &self {
            ProductEvent::Reserved(data) => {
                encode(topics::PRODUCTS_EVENTS, order_id, event_type, data)
            }
            ProductEvent::ReservationFailed(data) => {
                encode(topics::PRODUCTS_EVENTS, order_id, event_type, data)
            }
            ProductEvent::ReservationCanceled(data) => {
                encode(topics::PRODUCTS_EVENTS, order_id, event_type, data)
            }
        }
    }

    /// Decodes an envelope from the `products-events` channel.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, MessageError> {
        match envelope.event_type() {
            "ProductReserved" => Ok(ProductEvent::Reserved(decode(envelope)?)),
            "ProductReservationFailed" => Ok(ProductEvent::ReservationFailed(decode(envelope)?)),
            "ProductReservationCanceled" => {
                Ok(ProductEvent::ReservationCanceled(decode(envelope)?))
            }
            other => Err(MessageError::UnknownType {
                topic: envelope.topic.clone(),
                event_type: other.to_string(),
            }),
        }
    }
}

/// A charge succeeded and a payment record exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProcessed {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub amount: Money,
}

/// A charge was declined; carries the business reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub order_id: OrderId,
    pub reason: String,
}

/// Events on the `payments-events` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PaymentEvent {
    Processed(PaymentProcessed),
    Failed(PaymentFailed),
}

impl PaymentEvent {
    /// Wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::Processed(_) => "PaymentProcessed",
            PaymentEvent::Failed(_) => "PaymentFailed",
        }
    }

    /// The order this event belongs to.
    pub fn order_id(&self) -> OrderId {
        match self {
            PaymentEvent::Processed(data) => data.order_id,
            PaymentEvent::Failed(data) => data.order_id,
        }
    }

    /// Wraps the event into a bus envelope keyed by its order id.
    pub fn into_envelope(self) -> Result<Envelope, serde_json::Error> {
        let (order_id, event_type) = (self.order_id(), self.event_type());
        match &self {
            PaymentEvent::Processed(data) => {
                encode(topics::PAYMENTS_EVENTS, order_id, event_type, data)
            }
            PaymentEvent::Failed(data) => {
                encode(topics::PAYMENTS_EVENTS, order_id, event_type, data)
            }
        }
    }

    /// Decodes an envelope from the `payments-events` channel.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, MessageError> {
        match envelope.event_type() {
            "PaymentProcessed" => Ok(PaymentEvent::Processed(decode(envelope)?)),
            "PaymentFailed" => Ok(PaymentEvent::Failed(decode(envelope)?)),
            other => Err(MessageError::UnknownType {
                topic: envelope.topic.clone(),
                event_type: other.to_string(),
            }),
        }
    }
}
