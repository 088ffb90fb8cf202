//! Plain TCP transport.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

use evloop_core::{Result, Socket, SocketFactory};

/// A `Socket` that passes bytes straight through to the `TcpStream`.
#[derive(Debug)]
pub struct PlainSocket {
    stream: TcpStream,
    closed: AtomicBool,
}

impl PlainSocket {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            closed: AtomicBool::new(false),
        }
    }
}

impl Socket for PlainSocket {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.stream).write(buf)
    }

    fn stream(&self) -> &TcpStream {
        &self.stream
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.stream.shutdown(Shutdown::Both) {
            // Peer already gone: nothing left to shut down.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Produces `PlainSocket`s. Sets TCP_NODELAY when configured.
#[derive(Debug, Clone)]
pub struct PlainFactory {
    nodelay: bool,
}

impl PlainFactory {
    pub fn new() -> Self {
        Self { nodelay: true }
    }

    pub fn nodelay(mut self, enable: bool) -> Self {
        self.nodelay = enable;
        self
    }
}

impl Default for PlainFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketFactory for PlainFactory {
    fn create(&self, stream: TcpStream) -> Result<Box<dyn Socket>> {
        if self.nodelay {
            stream.set_nodelay(true)?;
        }
        trace!(nodelay = self.nodelay, "plain socket created");
        Ok(Box::new(PlainSocket::new(stream)))
    }
}
