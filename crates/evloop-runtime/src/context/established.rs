//! `EstablishedContext`: one accepted, wired connection.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use evloop_core::{Interest, InterestOps, Result, Socket, TaskExecutor};

use super::Context;
use crate::config::ConnectionConfig;
use crate::egress::Egress;
use crate::ingress::Ingress;
use crate::selector::ReadyEvent;

/// Live connection: socket + interest handle + ingress/egress.
///
/// The dispatch thread never reads or writes the socket itself. On READ
/// (WRITE) readiness it clears that interest and offloads an ingress run
/// (egress flush) to the executor, which re-arms the interest when done.
pub struct EstablishedContext {
    socket: Box<dyn Socket>,
    interest_ops: Arc<dyn InterestOps>,
    executor: Arc<dyn TaskExecutor>,
    ingress: Ingress,
    egress: Egress,
    config: ConnectionConfig,
    closed: AtomicBool,
    last_activity: Mutex<Instant>,
    idle_fired: AtomicBool,
    this: Weak<EstablishedContext>,
}

impl EstablishedContext {
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        socket: Box<dyn Socket>,
        interest_ops: Arc<dyn InterestOps>,
        config: ConnectionConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<EstablishedContext>| EstablishedContext {
            ingress: Ingress::new(this.clone(), Arc::clone(&interest_ops), config.read_buffer_size),
            egress: Egress::new(this.clone(), Arc::clone(&interest_ops)),
            socket,
            interest_ops,
            executor,
            config,
            closed: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
            idle_fired: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    /// Pipeline registration point.
    pub fn ingress(&self) -> &Ingress {
        &self.ingress
    }

    pub fn egress(&self) -> &Egress {
        &self.egress
    }

    pub fn socket(&self) -> &dyn Socket {
        self.socket.as_ref()
    }

    pub fn interest_ops(&self) -> &Arc<dyn InterestOps> {
        &self.interest_ops
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Record read activity for idle tracking.
    pub(crate) fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
        self.idle_fired.store(false, Ordering::Relaxed);
    }

    fn offload<F>(&self, what: &'static str, work: F)
    where
        F: FnOnce(&EstablishedContext) + Send + 'static,
    {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        if let Err(e) = self.executor.submit(Box::new(move || work(&this))) {
            warn!(task = what, error = %e, "offload failed, closing connection");
            self.close();
        }
    }
}

impl Context for EstablishedContext {
    fn handle_event(&self, event: &ReadyEvent) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let ready = event.ready();

        if ready.is_readable() {
            match self.interest_ops.remove(Interest::READ) {
                Ok(_) => self.offload("ingress", |ctx| ctx.ingress.run()),
                Err(e) if e.is_cancelled() => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "clearing READ failed, closing connection");
                    self.close();
                    return Ok(());
                }
            }
        }

        if ready.is_writable() && !self.is_closed() {
            match self.interest_ops.remove(Interest::WRITE) {
                Ok(_) => self.offload("egress", |ctx| ctx.egress.run()),
                Err(e) if e.is_cancelled() => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "clearing WRITE failed, closing connection");
                    self.close();
                }
            }
        }
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(peer = ?self.socket.peer_addr().ok(), "closing connection");
        // Deregister before the fd can go away.
        self.interest_ops.cancel();
        if let Err(e) = self.socket.close() {
            debug!(error = %e, "socket close failed");
        }
        self.egress.clear();
        self.ingress.close();
    }

    fn channel_fd(&self) -> RawFd {
        self.socket.stream().as_raw_fd()
    }

    fn initial_interest(&self) -> Interest {
        Interest::empty()
    }

    fn on_tick(&self, now: Instant) {
        let Some(idle) = self.config.idle_timeout else {
            return;
        };
        if self.is_closed() {
            return;
        }
        let last = *self.last_activity.lock();
        if now.saturating_duration_since(last) >= idle
            && !self.idle_fired.swap(true, Ordering::Relaxed)
        {
            debug!(idle_ms = idle.as_millis() as u64, "connection idle");
            self.offload("timeout", |ctx| ctx.ingress.timeout());
        }
    }
}

impl std::fmt::Debug for EstablishedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstablishedContext")
            .field("fd", &self.channel_fd())
            .field("interest", &self.interest_ops.current())
            .field("closed", &self.is_closed())
            .finish()
    }
}
