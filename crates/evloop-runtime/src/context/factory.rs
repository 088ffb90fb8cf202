//! Builds `ListenContext`s bound to an address.

use std::net::{TcpListener, ToSocketAddrs};
use std::sync::Arc;

use tracing::info;

use evloop_core::{Result, SocketFactory, TaskExecutor};

use super::ListenContext;
use crate::clock::ClockFactory;
use crate::config::ConnectionConfig;

/// Shared wiring for every listener it opens: the executor connections
/// offload to, how accepted streams are wrapped, and which clock each
/// connection's ingress is driven by.
pub struct ListenContextFactory {
    executor: Arc<dyn TaskExecutor>,
    socket_factory: Arc<dyn SocketFactory>,
    clock_factory: Arc<dyn ClockFactory>,
    connection: ConnectionConfig,
}

impl ListenContextFactory {
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        socket_factory: Arc<dyn SocketFactory>,
        clock_factory: Arc<dyn ClockFactory>,
    ) -> Self {
        Self {
            executor,
            socket_factory,
            clock_factory,
            connection: ConnectionConfig::new(),
        }
    }

    /// Settings applied to every accepted connection.
    pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }

    /// Bind `addr` and return a non-blocking listen context, ready for
    /// `EventLoop::register`.
    pub fn open<A: ToSocketAddrs>(&self, addr: A) -> Result<Arc<ListenContext>> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let ctx = ListenContext::new(
            listener,
            Arc::clone(&self.executor),
            Arc::clone(&self.socket_factory),
            Arc::clone(&self.clock_factory),
            self.connection.clone(),
        )?;
        info!(addr = %ctx.local_addr(), "listening");
        Ok(Arc::new(ctx))
    }
}

impl std::fmt::Debug for ListenContextFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenContextFactory")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::context::{Context, EstablishedContext};
    use crate::pool::InlineExecutor;
    use crate::socket::PlainFactory;
    use evloop_core::Interest;

    struct NullClock;

    impl Clock for NullClock {
        fn advance(&mut self, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    fn factory() -> ListenContextFactory {
        let clocks = |_: &Arc<EstablishedContext>| -> Box<dyn Clock> { Box::new(NullClock) };
        ListenContextFactory::new(
            Arc::new(InlineExecutor::new()),
            Arc::new(PlainFactory::new()),
            Arc::new(clocks),
        )
    }

    #[test]
    fn test_open_binds_ephemeral_port() {
        let ctx = factory().open("127.0.0.1:0").unwrap();
        assert_ne!(ctx.local_addr().port(), 0);
        assert_eq!(ctx.initial_interest(), Interest::ACCEPT);
        assert!(!ctx.is_closed());
    }

    #[test]
    fn test_open_address_in_use() {
        let f = factory();
        let first = f.open("127.0.0.1:0").unwrap();
        assert!(f.open(first.local_addr()).is_err());
    }
}
