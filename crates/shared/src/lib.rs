//! Shared wire types for the rentline realtime client.
//!
//! Entity models, the closed client/server event unions and the
//! Socket.IO packet codec live here so any Rust participant speaks the
//! same protocol.

pub mod error;
pub mod models;
pub mod packet;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use packet::*;
pub use protocol::*;
