//! The seam between the connection manager and the wire.

use async_trait::async_trait;
use rentline_shared::EventFrame;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::error::TransportError;

/// An established duplex session.
///
/// Dropping `outbound` asks the transport to close. `inbound` yields `None`
/// once the transport is gone, which the manager treats as a drop.
pub struct TransportLink {
    pub outbound: UnboundedSender<EventFrame>,
    pub inbound: UnboundedReceiver<EventFrame>,
}

/// Opens transport sessions. `open` resolves once the server has accepted
/// the connection (handshake complete) or fails with the reason it did not.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, token: &str) -> Result<TransportLink, TransportError>;
}
