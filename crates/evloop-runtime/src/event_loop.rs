//! `EventLoop`: the single dispatch thread.
//!
//! ```text
//! loop {
//!     select(poll_timeout) ──► for each ReadyEvent:
//!                                 key.attachment().handle_event(ev)
//!     every tick_interval  ──► for each key: attachment.on_tick(now)
//! }
//! ```
//!
//! Handlers run strictly one after another on the thread that calls
//! [`EventLoop::run`] or [`EventLoop::poll`]. A handler `Err` is logged and
//! dropped; a handler panic is a defect and unwinds out of `poll`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, trace};

use evloop_core::Result;

use crate::config::EventLoopConfig;
use crate::context::Context;
use crate::selector::{Events, SelectionKey, Selector};

pub struct EventLoop {
    selector: Selector,
    config: EventLoopConfig,
    events: Mutex<Events>,
    stopped: AtomicBool,
    last_tick: Mutex<Instant>,
}

impl EventLoop {
    pub fn new(config: EventLoopConfig) -> Result<Self> {
        let selector = Selector::new()?;
        Ok(Self {
            events: Mutex::new(Events::with_capacity(config.poll_capacity)),
            selector,
            config,
            stopped: AtomicBool::new(false),
            last_tick: Mutex::new(Instant::now()),
        })
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn config(&self) -> &EventLoopConfig {
        &self.config
    }

    /// Register `context` under its own channel and initial interest set.
    pub fn register(&self, context: Arc<dyn Context>) -> Result<Arc<SelectionKey>> {
        let key = self.selector.register(
            context.channel_fd(),
            context.initial_interest(),
            Arc::clone(&context),
        )?;
        context.on_register(&key);
        debug!(token = key.token(), fd = key.fd(), interest = %key.interest(), "context registered");
        Ok(key)
    }

    /// One iteration: wait, dispatch, tick. Returns the number of events
    /// dispatched.
    pub fn poll(&self) -> Result<usize> {
        let ready = {
            let mut events = self.events.lock();
            self.selector.select(&mut events, self.config.poll_timeout)?
        };

        let mut dispatched = 0;
        for event in &ready {
            let Some(ctx) = event.key().attachment() else {
                continue;
            };
            trace!(token = event.key().token(), ready = %event.ready(), "dispatch");
            if let Err(e) = ctx.handle_event(event) {
                error!(token = event.key().token(), error = %e, "event handler failed");
            }
            dispatched += 1;
        }

        self.maybe_tick();
        Ok(dispatched)
    }

    fn maybe_tick(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_tick.lock();
            if now.saturating_duration_since(*last) < self.config.tick_interval {
                return;
            }
            *last = now;
        }
        for key in self.selector.keys() {
            if let Some(ctx) = key.attachment() {
                ctx.on_tick(now);
            }
        }
    }

    /// Dispatch until [`stop`](Self::stop) or the selector closes.
    pub fn run(&self) -> Result<()> {
        info!(keys = self.selector.len(), "event loop running");
        while !self.stopped.load(Ordering::Acquire) {
            match self.poll() {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => break,
                Err(e) => return Err(e),
            }
        }
        info!("event loop stopped");
        Ok(())
    }

    /// Ask `run` to return after the current iteration. Any thread.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Err(e) = self.selector.wakeup() {
            debug!(error = %e, "wakeup on stop failed");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Interrupt a blocked `poll`.
    pub fn wakeup(&self) -> Result<()> {
        self.selector.wakeup()
    }

    /// Close every attached context, then the selector.
    pub fn close(&self) {
        let keys = self.selector.keys();
        debug!(keys = keys.len(), "closing event loop");
        for key in keys {
            if let Some(ctx) = key.attachment() {
                ctx.close();
            }
        }
        self.selector.close();
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("selector", &self.selector)
            .field("config", &self.config)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Builds event loops from one validated config.
#[derive(Debug, Clone)]
pub struct EventLoopFactory {
    config: EventLoopConfig,
}

impl EventLoopFactory {
    pub fn new(config: EventLoopConfig) -> Self {
        Self { config }
    }

    pub fn create(&self) -> Result<EventLoop> {
        EventLoop::new(self.config.clone())
    }
}

impl Default for EventLoopFactory {
    fn default() -> Self {
        Self::new(EventLoopConfig::default())
    }
}
