//! Error types for connecting to the realtime server.
//!
//! Only `connect` reports failures. Emits, room changes and listener
//! registration degrade to queueing instead of erroring.

use std::time::Duration;

use thiserror::Error;

/// Why a bearer token was refused before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("credential is malformed: {0}")]
    Malformed(String),

    #[error("credential has expired")]
    Expired,

    #[error("credential is not valid yet")]
    NotYetValid,

    #[error("credential is missing the `{0}` claim")]
    MissingClaim(String),
}

impl From<jsonwebtoken::errors::Error> for CredentialError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => CredentialError::Expired,
            ErrorKind::ImmatureSignature => CredentialError::NotYetValid,
            ErrorKind::MissingRequiredClaim(claim) => CredentialError::MissingClaim(claim.clone()),
            _ => CredentialError::Malformed(err.to_string()),
        }
    }
}

/// Transport-level failure while opening or running a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(String),

    /// The server answered the namespace connect with `connect_error`.
    #[error("server rejected the connection: {0}")]
    Rejected(String),

    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed during handshake")]
    Closed,

    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl From<rentline_shared::ProtocolError> for TransportError {
    fn from(err: rentline_shared::ProtocolError) -> Self {
        TransportError::Protocol(err.to_string())
    }
}

/// Rejection of a connect handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// Credential refused locally. Retrying with the same token cannot help.
    #[error("invalid credential: {0}")]
    Credential(#[from] CredentialError),

    #[error("handshake attempt {attempt} failed: {cause}")]
    Handshake { attempt: u32, cause: TransportError },

    /// The attempt budget is spent; the next `connect` starts a fresh cycle.
    #[error("gave up after {attempts} failed attempts: {cause}")]
    RetriesExhausted { attempts: u32, cause: TransportError },

    /// `disconnect` was called while the handshake was in flight.
    #[error("connection attempt cancelled")]
    Cancelled,
}

impl ConnectError {
    /// The underlying transport failure, if this was one.
    pub fn cause(&self) -> Option<&TransportError> {
        match self {
            ConnectError::Handshake { cause, .. } | ConnectError::RetriesExhausted { cause, .. } => {
                Some(cause)
            }
            _ => None,
        }
    }
}

pub type ConnectResult<T = ()> = Result<T, ConnectError>;
