//! Real-time connection layer.
//!
//! - [`transport`]: the seam to an actual WebSocket implementation
//! - [`connection`]: the self-reconnecting socket with its outbound queue
//! - [`room`]: host / party / room to URL resolution
//!
//! # Architecture
//!
//! ```text
//!   WsHandle ──commands──▶ driver task ──frames──▶ Connector (tungstenite)
//!                              │
//!                              └──SocketEvent──▶ session actor
//! ```

pub mod connection;
pub mod room;
pub mod transport;

pub use connection::{connect, ConnectionState, SocketEvent, SocketOptions, WsHandle};
pub use room::{
    http_origin, normalize_host, AddressError, Query, QueryParams, RoomAddress, RoomOptions,
    Scheme, UrlProvider,
};
pub use transport::{Connector, Frame, Transport, TransportError, TungsteniteConnector};
