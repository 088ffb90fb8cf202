//! Transport socket abstraction.
//!
//! A `Socket` presents a uniform read/write contract over a connected
//! channel, whether the transport underneath is plain TCP or needs a
//! cryptographic handshake first. Handshake steps, when there are any,
//! run through `read`/`write` themselves; nothing here blocks.

use std::io;
use std::net::{SocketAddr, TcpStream};

use crate::error::Result;

/// Transport-abstracted view of one connected channel.
pub trait Socket: Send + Sync {
    /// Read payload bytes. `Ok(0)` is EOF; `WouldBlock` means no data yet.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write payload bytes. May write fewer than `buf.len()`.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// The underlying OS channel (for registration and socket options).
    fn stream(&self) -> &TcpStream;

    /// Remote endpoint of the connection.
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream().peer_addr()
    }

    /// Local endpoint of the connection.
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream().local_addr()
    }

    /// Shut the transport down. Idempotent.
    fn close(&self) -> io::Result<()>;
}

/// Wraps a freshly accepted channel in a `Socket`.
///
/// **Contract:** `create()` must not block. The factory alone decides
/// plain vs. encrypted; the accepting side is agnostic.
pub trait SocketFactory: Send + Sync {
    fn create(&self, stream: TcpStream) -> Result<Box<dyn Socket>>;
}
