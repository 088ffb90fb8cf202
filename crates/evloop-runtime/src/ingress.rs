//! Ingress: the read side of an established connection.
//!
//! Runs on a worker. The dispatch thread clears READ before it offloads a
//! run, so at most one run per connection is in flight; the run re-arms
//! READ once the socket reports `WouldBlock`.
//!
//! Clocks are released exactly once the context is closed. `close()` only
//! `try_lock`s, so every other holder of the clock lock re-checks the
//! context after releasing it and drains the clocks itself (`settle`).
//! `EstablishedContext::close` flips its flag before it calls `close()`,
//! so a holder that made `close()` miss the lock always sees the flag.

use std::io;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use evloop_core::{Interest, InterestOps, Result};

use crate::clock::Clock;
use crate::context::{Context, EstablishedContext};

/// How a read run ended.
enum Drain {
    /// Socket would block; READ should be re-armed.
    Pending,
    /// EOF, read error or a rejecting clock: close the connection.
    Shut,
    /// The context was closed underneath the run.
    Closed,
}

pub struct Ingress {
    context: Weak<EstablishedContext>,
    interest_ops: Arc<dyn InterestOps>,
    clocks: Mutex<Vec<Box<dyn Clock>>>,
    buffer_size: usize,
}

impl Ingress {
    pub(crate) fn new(
        context: Weak<EstablishedContext>,
        interest_ops: Arc<dyn InterestOps>,
        buffer_size: usize,
    ) -> Self {
        Self {
            context,
            interest_ops,
            clocks: Mutex::new(Vec::new()),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Attach a clock and start reading.
    ///
    /// On a closed connection the clock is closed right away and the
    /// cancellation is returned.
    pub fn register(&self, clock: Box<dyn Clock>) -> Result<()> {
        self.clocks.lock().push(clock);
        let armed = self.interest_ops.add(Interest::READ);
        self.settle();
        armed.map(|_| ())
    }

    /// Registered clocks.
    pub fn clock_count(&self) -> usize {
        self.clocks.lock().len()
    }

    /// Drain the socket into the clocks until it would block.
    pub(crate) fn run(&self) {
        let Some(ctx) = self.context.upgrade() else {
            return;
        };
        let outcome = {
            let mut clocks = self.clocks.lock();
            if ctx.is_closed() {
                Drain::Closed
            } else {
                self.drain(&ctx, &mut clocks)
            }
        };

        match outcome {
            Drain::Pending => {
                if let Err(e) = self.interest_ops.add(Interest::READ) {
                    if !e.is_cancelled() {
                        warn!(error = %e, "re-arming READ failed, closing connection");
                        ctx.close();
                    }
                }
            }
            Drain::Shut => ctx.close(),
            Drain::Closed => {}
        }
        self.settle();
    }

    fn drain(&self, ctx: &EstablishedContext, clocks: &mut Vec<Box<dyn Clock>>) -> Drain {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            match ctx.socket().read(&mut buf) {
                Ok(0) => {
                    debug!(peer = ?ctx.socket().peer_addr().ok(), "peer closed connection");
                    return Drain::Shut;
                }
                Ok(n) => {
                    ctx.touch();
                    trace!(bytes = n, "ingress read");
                    let advanced = clocks.iter_mut().try_for_each(|c| c.advance(&buf[..n]));
                    if let Err(e) = advanced {
                        warn!(error = %e, "clock rejected input, closing connection");
                        return Drain::Shut;
                    }
                    // A clock may close the context from inside `advance`.
                    if ctx.is_closed() {
                        return Drain::Closed;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Drain::Pending,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "read failed, closing connection");
                    return Drain::Shut;
                }
            }
        }
    }

    /// Deliver an idle timeout to every clock.
    pub(crate) fn timeout(&self) {
        for clock in self.clocks.lock().iter_mut() {
            clock.on_timeout();
        }
        self.settle();
    }

    /// Close and drop every clock, if no one else holds them. A holder
    /// notices the closed context in `settle` and does this itself.
    pub(crate) fn close(&self) {
        if let Some(mut clocks) = self.clocks.try_lock() {
            Self::close_clocks(&mut clocks);
        }
    }

    /// Call after releasing the clock lock: drain the clocks if the
    /// context closed meanwhile.
    fn settle(&self) {
        if self.context.upgrade().map_or(true, |ctx| ctx.is_closed()) {
            Self::close_clocks(&mut self.clocks.lock());
        }
    }

    fn close_clocks(clocks: &mut Vec<Box<dyn Clock>>) {
        for mut clock in clocks.drain(..) {
            clock.close();
        }
    }
}
