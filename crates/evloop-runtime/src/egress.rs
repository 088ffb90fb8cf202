//! Egress: the write side of an established connection.
//!
//! `accept` queues bytes from any thread and arms WRITE; the dispatch
//! thread offloads a flush when the socket becomes writable.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use evloop_core::{Interest, InterestOps, NetError, Result};

use crate::context::{Context, EstablishedContext};

pub struct Egress {
    context: Weak<EstablishedContext>,
    interest_ops: Arc<dyn InterestOps>,
    pending: Mutex<VecDeque<Vec<u8>>>,
}

impl Egress {
    pub(crate) fn new(context: Weak<EstablishedContext>, interest_ops: Arc<dyn InterestOps>) -> Self {
        Self {
            context,
            interest_ops,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue `bytes` for writing. Safe from any thread.
    pub fn accept(&self, bytes: Vec<u8>) -> Result<()> {
        if self.context.upgrade().map_or(true, |ctx| ctx.is_closed()) {
            return Err(NetError::Closed);
        }
        if bytes.is_empty() {
            return Ok(());
        }
        self.pending.lock().push_back(bytes);
        self.interest_ops.add(Interest::WRITE)?;
        Ok(())
    }

    /// Bytes still waiting for the socket.
    pub fn pending_bytes(&self) -> usize {
        self.pending.lock().iter().map(Vec::len).sum()
    }

    /// Write queued bytes until empty or the socket would block.
    pub(crate) fn run(&self) {
        let Some(ctx) = self.context.upgrade() else {
            return;
        };
        if ctx.is_closed() {
            return;
        }

        let mut pending = self.pending.lock();
        while let Some(front) = pending.front_mut() {
            match ctx.socket().write(front) {
                Ok(0) => {
                    debug!("socket accepted no bytes, closing connection");
                    drop(pending);
                    ctx.close();
                    return;
                }
                Ok(n) if n == front.len() => {
                    trace!(bytes = n, "egress wrote");
                    pending.pop_front();
                }
                Ok(n) => {
                    trace!(bytes = n, remaining = front.len() - n, "egress partial write");
                    front.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "write failed, closing connection");
                    drop(pending);
                    ctx.close();
                    return;
                }
            }
        }

        let more = !pending.is_empty();
        drop(pending);
        if more {
            if let Err(e) = self.interest_ops.add(Interest::WRITE) {
                if !e.is_cancelled() {
                    warn!(error = %e, "re-arming WRITE failed, closing connection");
                    ctx.close();
                }
            }
        }
    }

    pub(crate) fn clear(&self) {
        self.pending.lock().clear();
    }
}
