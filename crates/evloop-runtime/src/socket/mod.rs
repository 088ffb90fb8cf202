//! Socket transports.
//!
//! Only the plain transport lives here. An encrypted transport plugs in
//! through the same [`SocketFactory`](evloop_core::SocketFactory) seam and
//! drives its handshake from inside `Socket::read`/`Socket::write`.

mod plain;

pub use plain::{PlainFactory, PlainSocket};
