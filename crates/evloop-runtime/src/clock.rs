//! Per-connection pipeline entry point.
//!
//! A `Clock` is what the ingress drives: every chunk read from the
//! connection advances it, and idle timeouts are delivered to it. The
//! `ClockFactory` builds one per accepted connection from the live
//! `EstablishedContext`, so the clock can answer through the context's
//! egress.

use std::sync::Arc;

use evloop_core::Result;

use crate::context::EstablishedContext;

pub trait Clock: Send {
    /// Consume bytes read from the connection. `Err` closes the connection.
    fn advance(&mut self, bytes: &[u8]) -> Result<()>;

    /// No bytes arrived for the configured idle period.
    fn on_timeout(&mut self) {}

    /// The connection is closing. Release anything tied to it.
    fn close(&mut self) {}
}

pub trait ClockFactory: Send + Sync {
    fn create(&self, context: &Arc<EstablishedContext>) -> Box<dyn Clock>;
}

impl<F> ClockFactory for F
where
    F: Fn(&Arc<EstablishedContext>) -> Box<dyn Clock> + Send + Sync,
{
    fn create(&self, context: &Arc<EstablishedContext>) -> Box<dyn Clock> {
        self(context)
    }
}
