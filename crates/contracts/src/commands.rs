//! Commands the orchestrator addresses to the state-holding services.
//!
//! A command is a request, not a fact: the owning service may refuse it for
//! business reasons, in which case it publishes the typed failure event
//! instead of erroring.

use common::{Money, OrderId, ProductId};
use messaging::{Envelope, topics};
use serde::{Deserialize, Serialize};

use crate::error::MessageError;
use crate::events::{decode, encode};

/// Reserve stock for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveProduct {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Undo a previously made reservation. The compensating counterpart of
/// [`ReserveProduct`]; reverses exactly the reserve delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelProductReservation {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Commands on the `products-commands` channel, consumed only by the
/// inventory service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProductCommand {
    Reserve(ReserveProduct),
    CancelReservation(CancelProductReservation),
}

impl ProductCommand {
    /// Wire name of this command.
    pub fn event_type(&self) -> &'static str {
        match self {
            ProductCommand::Reserve(_) => "ReserveProduct",
            ProductCommand::CancelReservation(_) => "CancelProductReservation",
        }
    }

    /// The order this command belongs to.
    pub fn order_id(&self) -> OrderId {
        match self {
            ProductCommand::Reserve(data) => data.order_id,
            ProductCommand::CancelReservation(data) => data.order_id,
        }
    }

    /// Wraps the command into a bus envelope keyed by its order id.
    pub fn into_envelope(self) -> Result<Envelope, serde_json::Error> {
        let (order_id, event_type) = (self.order_id(), self.event_type());
        match &self {
            ProductCommand::Reserve(data) => {
                encode(topics::PRODUCTS_COMMANDS, order_id, event_type, data)
            }
            ProductCommand::CancelReservation(data) => {
                encode(topics::PRODUCTS_COMMANDS, order_id, event_type, data)
            }
        }
    }

    /// Decodes an envelope from the `products-commands` channel.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, MessageError> {
        match envelope.event_type() {
            "ReserveProduct" => Ok(ProductCommand::Reserve(decode(envelope)?)),
            "CancelProductReservation" => {
                Ok(ProductCommand::CancelReservation(decode(envelope)?))
            }
            other => Err(MessageError::UnknownType {
                topic: envelope.topic.clone(),
                event_type: other.to_string(),
            }),
        }
    }
}

/// Charge the customer for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessPayment {
    pub order_id: OrderId,
    pub amount: Money,
}

/// Commands on the `payments-commands` channel, consumed only by the
/// payments service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PaymentCommand {
    Process(ProcessPayment),
}

impl PaymentCommand {
    /// Wire name of this command.
    pub fn event_type(&self) -> &'static str {
        match self {
            PaymentCommand::Process(_) => "ProcessPayment",
        }
    }

    /// The order this command belongs to.
    pub fn order_id(&self) -> OrderId {
        match self {
            PaymentCommand::Process(data) => data.order_id,
        }
    }

    /// Wraps the command into a bus envelope keyed by its order id.
    pub fn into_envelope(self) -> Result<Envelope, serde_json::Error> {
        let (order_id, event_type) = (self.order_id(), self.event_type());
        match &self {
            PaymentCommand::Process(data) => {
                encode(topics::PAYMENTS_COMMANDS, order_id, event_type, data)
            }
        }
    }

    /// Decodes an envelope from the `payments-commands` channel.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, MessageError> {
        match envelope.event_type() {
            "ProcessPayment" => Ok(PaymentCommand::Process(decode(envelope)?)),
            other => Err(MessageError::UnknownType {
                topic: envelope.topic.clone(),
                event_type: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_product_envelope_roundtrip() {
        let command = ProductCommand::Reserve(ReserveProduct {
            order_id: OrderId::new(),
            product_id: ProductId::new("SKU-001"),
            quantity: 2,
        });
        let order_id = command.order_id();

        let envelope = command.clone().into_envelope().unwrap();
        assert_eq!(envelope.topic, topics::PRODUCTS_COMMANDS);
        assert_eq!(envelope.partition_key, order_id.to_string());

        let decoded = ProductCommand::from_envelope(&envelope).unwrap();
        assert_eq!(decoded, command);
    }

    #[test]
    fn unknown_command_is_rejected() {
        let envelope = Envelope::new(
            topics::PAYMENTS_COMMANDS,
            "order-1",
            "RefundPayment",
            serde_json::json!({}),
        );

        let err = PaymentCommand::from_envelope(&envelope).unwrap_err();
        assert!(matches!(err, MessageError::UnknownType { .. }));
    }
}
