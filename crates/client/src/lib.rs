//! Rentline realtime client
//!
//! The push side of the rental marketplace: one shared Socket.IO
//! connection, an event router, room membership and view-scoped hooks for
//! chat, rentals and products.

pub mod config;
pub mod credential;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod registry;
pub mod stores;
pub mod ws;

pub use config::RealtimeConfig;
pub use credential::Credential;
pub use error::{ConnectError, ConnectResult, CredentialError, TransportError};
pub use hooks::{RealtimeChat, RealtimeProduct, RealtimeRental};
pub use registry::ListenerRegistry;
pub use ws::{ConnectionState, RealtimeClient, Room};
