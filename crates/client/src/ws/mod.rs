//! Realtime connection to the marketplace server.
//!
//! ```text
//!   hooks (chat / rental / product)
//!        │  on / off / emit / join / leave
//!        ▼
//!   RealtimeClient ── ListenerRegistry ── dispatch by EventKind
//!        │  TransportLink (mpsc in/out)
//!        ▼
//!   Connector (SocketIoConnector in production, mocks in tests)
//! ```
//!
//! Everything a caller emits or registers before the connection is up is
//! buffered and replayed, in order, once the handshake succeeds.

mod connection;
mod manager;
mod rooms;
mod socket_io;
mod transport;

pub use connection::{ConnectionState, ReconnectConfig};
pub use manager::{listener, ConnectHandle, Listener, RealtimeClient};
pub use rooms::Room;
pub use socket_io::SocketIoConnector;
pub use transport::{Connector, TransportLink};
