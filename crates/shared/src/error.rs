//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while encoding or decoding realtime traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The packet text does not follow the Engine.IO / Socket.IO framing.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// The server pushed an event name this client does not know.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// The event name is known but its payload has the wrong shape.
    #[error("invalid payload for `{event}`: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
