//! `ListenContext`: turns an acceptable listener into wired connections.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, enabled, warn, Level};

use evloop_core::{Interest, Result, Socket, SocketFactory, TaskExecutor};

use super::{Context, EstablishedContext, EstablishedContextStub};
use crate::clock::ClockFactory;
use crate::config::ConnectionConfig;
use crate::interest_ops::InterestOpsImpl;
use crate::selector::{ReadyEvent, SelectionKey};

/// Dispatch target for one listening socket.
///
/// Owns the listener for its whole life. Built by
/// [`ListenContextFactory`](super::ListenContextFactory).
pub struct ListenContext {
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    executor: Arc<dyn TaskExecutor>,
    socket_factory: Arc<dyn SocketFactory>,
    clock_factory: Arc<dyn ClockFactory>,
    connection: ConnectionConfig,
    stub: Arc<EstablishedContextStub>,
    key: Mutex<Option<Weak<SelectionKey>>>,
}

impl ListenContext {
    pub(super) fn new(
        listener: TcpListener,
        executor: Arc<dyn TaskExecutor>,
        socket_factory: Arc<dyn SocketFactory>,
        clock_factory: Arc<dyn ClockFactory>,
        connection: ConnectionConfig,
    ) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            executor,
            socket_factory,
            clock_factory,
            connection,
            stub: Arc::new(EstablishedContextStub::new()),
            key: Mutex::new(None),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_closed(&self) -> bool {
        self.listener.lock().is_none()
    }

    fn accept(&self) -> io::Result<Option<TcpStream>> {
        let guard = self.listener.lock();
        let Some(listener) = guard.as_ref() else {
            return Ok(None);
        };
        loop {
            match listener.accept() {
                Ok((stream, _)) => return Ok(Some(stream)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Register `stream` under the stub, then wire it up.
    fn establish(&self, event: &ReadyEvent, stream: TcpStream) -> Result<()> {
        let socket = self.socket_factory.create(stream)?;
        socket.stream().set_nonblocking(true)?;
        let fd = socket.stream().as_raw_fd();

        let selector = event.key().selector()?;
        let key = selector.register(fd, Interest::empty(), self.stub.clone())?;
        self.wire(key, socket)
    }

    /// Swap a live `EstablishedContext` in for the stub on `key` and hand
    /// it its clock. Cancellation anywhere in here means the connection is
    /// gone: the context is closed and no clock is created.
    fn wire(&self, key: Arc<SelectionKey>, socket: Box<dyn Socket>) -> Result<()> {
        let interest_ops = Arc::new(InterestOpsImpl::new(Arc::clone(&key)));
        let ctx = EstablishedContext::new(
            Arc::clone(&self.executor),
            socket,
            interest_ops,
            self.connection.clone(),
        );

        if let Err(e) = key.attach(ctx.clone()) {
            ctx.close();
            return Err(e);
        }

        let clock = self.clock_factory.create(&ctx);
        if let Err(e) = ctx.ingress().register(clock) {
            ctx.close();
            return Err(e);
        }
        Ok(())
    }
}

/// Log both ends of a fresh connection. Lookup failures are not fatal.
fn log_accepted(stream: &TcpStream) {
    match (stream.local_addr(), stream.peer_addr()) {
        (Ok(local), Ok(peer)) => debug!(%local, %peer, "accepted connection"),
        (Err(e), _) | (_, Err(e)) => warn!(error = %e, "address lookup failed for accepted connection"),
    }
}

impl Context for ListenContext {
    fn handle_event(&self, event: &ReadyEvent) -> Result<()> {
        if !event.is_acceptable() {
            return Ok(());
        }
        let Some(stream) = self.accept()? else {
            return Ok(());
        };
        if enabled!(Level::DEBUG) {
            log_accepted(&stream);
        }

        // Keep a handle so a failed setup can still close the connection.
        let fallback = stream.try_clone().ok();
        match self.establish(event, stream) {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => {
                warn!(error = %e, "registration cancelled, dropping accepted connection");
                if let Some(s) = fallback {
                    let _ = s.shutdown(std::net::Shutdown::Both);
                }
                Ok(())
            }
            Err(e) => {
                if let Some(s) = fallback {
                    let _ = s.shutdown(std::net::Shutdown::Both);
                }
                Err(e)
            }
        }
    }

    fn close(&self) {
        let Some(listener) = self.listener.lock().take() else {
            return;
        };
        if let Some(key) = self.key.lock().take().and_then(|k| k.upgrade()) {
            key.cancel();
        }
        drop(listener);
        debug!(addr = %self.local_addr, "listener closed");
    }

    /// The live listener's fd; `-1` once closed, so it cannot be
    /// registered again.
    fn channel_fd(&self) -> RawFd {
        self.listener.lock().as_ref().map_or(-1, |l| l.as_raw_fd())
    }

    fn initial_interest(&self) -> Interest {
        Interest::ACCEPT
    }

    fn on_register(&self, key: &Arc<SelectionKey>) {
        *self.key.lock() = Some(Arc::downgrade(key));
    }
}

impl std::fmt::Debug for ListenContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenContext")
            .field("addr", &self.local_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::context::ListenContextFactory;
    use crate::pool::InlineExecutor;
    use crate::selector::{Events, Selector};
    use crate::socket::PlainFactory;
    use evloop_core::NetError;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tracing_test::traced_test;

    struct NullClock;

    impl Clock for NullClock {
        fn advance(&mut self, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        created: AtomicUsize,
        contexts: Mutex<Vec<Arc<EstablishedContext>>>,
    }

    impl ClockFactory for Recorder {
        fn create(&self, ctx: &Arc<EstablishedContext>) -> Box<dyn Clock> {
            self.created.fetch_add(1, Ordering::SeqCst);
            self.contexts.lock().push(Arc::clone(ctx));
            Box::new(NullClock)
        }
    }

    /// Socket factory that runs `hook` before delegating to `PlainFactory`.
    struct Hooked<F>(F);

    impl<F: Fn() -> Result<()> + Send + Sync> SocketFactory for Hooked<F> {
        fn create(&self, stream: TcpStream) -> Result<Box<dyn Socket>> {
            (self.0)()?;
            PlainFactory::new().create(stream)
        }
    }

    fn open(
        socket_factory: Arc<dyn SocketFactory>,
        clocks: Arc<Recorder>,
    ) -> (Selector, Arc<ListenContext>, Arc<SelectionKey>) {
        let selector = Selector::new().unwrap();
        let listen = ListenContextFactory::new(
            Arc::new(InlineExecutor::new()),
            socket_factory,
            clocks,
        )
        .open("127.0.0.1:0")
        .unwrap();
        let key = selector
            .register(listen.channel_fd(), listen.initial_interest(), listen.clone())
            .unwrap();
        listen.on_register(&key);
        (selector, listen, key)
    }

    /// Wait for the listener's ACCEPT readiness.
    fn next_accept(selector: &Selector) -> ReadyEvent {
        let mut events = Events::with_capacity(8);
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let ready = selector.select(&mut events, Duration::from_millis(50)).unwrap();
            if let Some(event) = ready.into_iter().find(|e| e.is_acceptable()) {
                return event;
            }
        }
        panic!("no accept readiness within 5s");
    }

    fn is_nonblocking(fd: RawFd) -> bool {
        use nix::fcntl::{fcntl, FcntlArg, OFlag};
        let flags = fcntl(fd, FcntlArg::F_GETFL).unwrap();
        OFlag::from_bits_truncate(flags).contains(OFlag::O_NONBLOCK)
    }

    #[test]
    fn test_accept_builds_one_context() {
        let clocks = Arc::new(Recorder::default());
        let (selector, listen, _key) = open(Arc::new(PlainFactory::new()), clocks.clone());
        let client = TcpStream::connect(listen.local_addr()).unwrap();

        let event = next_accept(&selector);
        listen.handle_event(&event).unwrap();

        assert_eq!(clocks.created.load(Ordering::SeqCst), 1);
        let ctx = clocks.contexts.lock()[0].clone();
        assert!(is_nonblocking(ctx.channel_fd()));
        assert_eq!(ctx.socket().peer_addr().unwrap(), client.local_addr().unwrap());
        // Listener + one connection, stub retired.
        assert_eq!(selector.len(), 2);
        assert!(ctx.interest_ops().current().is_readable());
    }

    #[test]
    fn test_no_pending_connection_is_noop() {
        let clocks = Arc::new(Recorder::default());
        let (_selector, listen, key) = open(Arc::new(PlainFactory::new()), clocks.clone());

        listen
            .handle_event(&ReadyEvent::new(key, Interest::ACCEPT))
            .unwrap();
        assert_eq!(clocks.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_non_accept_readiness_is_ignored() {
        let clocks = Arc::new(Recorder::default());
        let (selector, listen, key) = open(Arc::new(PlainFactory::new()), clocks.clone());
        let _client = TcpStream::connect(listen.local_addr()).unwrap();

        listen.handle_event(&ReadyEvent::new(key, Interest::WRITE)).unwrap();
        assert_eq!(clocks.created.load(Ordering::SeqCst), 0);
        assert_eq!(selector.len(), 1);
    }

    #[traced_test]
    #[test]
    fn test_cancelled_registration_closes_connection() {
        let clocks = Arc::new(Recorder::default());
        let victim: Arc<Mutex<Option<Selector>>> = Arc::new(Mutex::new(None));
        let hook = {
            let victim = victim.clone();
            Hooked(move || {
                // Another actor closes the selector mid-accept.
                if let Some(s) = victim.lock().as_ref() {
                    s.close();
                }
                Ok(())
            })
        };
        let (selector, listen, _key) = open(Arc::new(hook), clocks.clone());
        *victim.lock() = Some(selector.clone());

        let mut client = TcpStream::connect(listen.local_addr()).unwrap();
        let event = next_accept(&selector);
        listen.handle_event(&event).unwrap();

        assert_eq!(clocks.created.load(Ordering::SeqCst), 0);
        assert!(logs_contain("registration cancelled"));
        assert!(!listen.is_closed());

        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_factory_error_leaves_listener_usable() {
        let clocks = Arc::new(Recorder::default());
        let fail_once = Arc::new(AtomicUsize::new(1));
        let hook = {
            let fail_once = fail_once.clone();
            Hooked(move || {
                if fail_once.fetch_sub(1, Ordering::SeqCst) == 1 {
                    return Err(io::Error::new(io::ErrorKind::Other, "handshake setup failed").into());
                }
                Ok(())
            })
        };
        let (selector, listen, _key) = open(Arc::new(hook), clocks.clone());

        let _first = TcpStream::connect(listen.local_addr()).unwrap();
        let event = next_accept(&selector);
        assert!(matches!(listen.handle_event(&event), Err(NetError::Io(_))));
        assert!(!listen.is_closed());

        let _second = TcpStream::connect(listen.local_addr()).unwrap();
        let event = next_accept(&selector);
        listen.handle_event(&event).unwrap();
        assert_eq!(clocks.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_twice() {
        let clocks = Arc::new(Recorder::default());
        let (selector, listen, key) = open(Arc::new(PlainFactory::new()), clocks);
        let addr = listen.local_addr();

        listen.close();
        listen.close();
        assert!(listen.is_closed());
        assert!(key.is_cancelled());
        assert!(selector.is_empty());
        assert!(TcpStream::connect(addr).is_err());
    }

    #[test]
    fn test_closed_listener_reports_no_channel() {
        let clocks = Arc::new(Recorder::default());
        let (selector, listen, _key) = open(Arc::new(PlainFactory::new()), clocks);
        assert!(listen.channel_fd() >= 0);

        listen.close();
        assert_eq!(listen.channel_fd(), -1);
        assert!(selector
            .register(listen.channel_fd(), listen.initial_interest(), listen.clone())
            .is_err());
        assert!(selector.is_empty());
    }

    #[test]
    fn test_key_cancelled_before_attach_drops_connection() {
        let clocks = Arc::new(Recorder::default());
        let (selector, listen, _key) = open(Arc::new(PlainFactory::new()), clocks.clone());
        let mut client = TcpStream::connect(listen.local_addr()).unwrap();

        let (server, _) = {
            let guard = listen.listener.lock();
            let listener = guard.as_ref().unwrap();
            listener.set_nonblocking(false).unwrap();
            listener.accept().unwrap()
        };
        server.set_nonblocking(true).unwrap();
        let socket = PlainFactory::new().create(server).unwrap();
        let key = selector
            .register(socket.stream().as_raw_fd(), Interest::empty(), listen.stub.clone())
            .unwrap();

        // Someone else cancels the fresh key before the context is attached.
        key.cancel();
        let err = listen.wire(key, socket).unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(clocks.created.load(Ordering::SeqCst), 0);
        assert!(clocks.contexts.lock().is_empty());
        assert_eq!(selector.len(), 1);

        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }
}
