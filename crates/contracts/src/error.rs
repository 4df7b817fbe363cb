use thiserror::Error;

/// Errors decoding a message from its envelope.
///
/// Both variants are unrecoverable for the message in hand: retrying the same
/// bytes can never succeed, so consumers route them to the dead-letter
/// channel instead of erroring forever.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The envelope's `event-type` header names no known message.
    #[error("unknown event type `{event_type}` on topic `{topic}`")]
    UnknownType { topic: String, event_type: String },

    /// The payload does not match the shape fixed for its event type.
    #[error("malformed `{event_type}` payload: {source}")]
    Malformed {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}
