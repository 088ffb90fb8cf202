//! `InterestOpsImpl`: default `InterestOps` over a `SelectionKey`.
//!
//! Strategy: lock-protected interest field. Each update takes the key's
//! interest mutex, computes the new set, and applies it to epoll before
//! releasing the mutex. Callers on the dispatch thread and on workers are
//! therefore serialized per key, and every update lands in the kernel in
//! the same order it lands in `current()`.

use std::sync::Arc;

use evloop_core::{Interest, InterestOps, Result};

use crate::selector::SelectionKey;

pub struct InterestOpsImpl {
    key: Arc<SelectionKey>,
}

impl InterestOpsImpl {
    pub fn new(key: Arc<SelectionKey>) -> Self {
        Self { key }
    }
}

impl InterestOps for InterestOpsImpl {
    fn add(&self, interest: Interest) -> Result<Interest> {
        self.key.update_interest(|current| current.add(interest))
    }

    fn remove(&self, interest: Interest) -> Result<Interest> {
        self.key.update_interest(|current| current.remove(interest))
    }

    fn current(&self) -> Interest {
        self.key.interest()
    }

    fn cancel(&self) {
        self.key.cancel();
    }
}

impl std::fmt::Debug for InterestOpsImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterestOpsImpl").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EstablishedContextStub;
    use crate::selector::Selector;
    use evloop_core::NetError;
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::AsRawFd;
    use std::thread;

    fn connected() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_add_remove_current() {
        let (_client, server) = connected();
        let selector = Selector::new().unwrap();
        let key = selector
            .register(server.as_raw_fd(), Interest::empty(), Arc::new(EstablishedContextStub))
            .unwrap();
        let ops = InterestOpsImpl::new(key);

        assert!(ops.current().is_empty());
        assert_eq!(ops.add(Interest::READ).unwrap(), Interest::READ);
        assert_eq!(ops.add(Interest::WRITE).unwrap(), Interest::READ | Interest::WRITE);
        assert_eq!(ops.remove(Interest::READ).unwrap(), Interest::WRITE);
        assert_eq!(ops.current(), Interest::WRITE);
    }

    #[test]
    fn test_concurrent_updates_converge() {
        let (_client, server) = connected();
        let selector = Selector::new().unwrap();
        let key = selector
            .register(server.as_raw_fd(), Interest::empty(), Arc::new(EstablishedContextStub))
            .unwrap();
        let ops = Arc::new(InterestOpsImpl::new(key));

        // Each thread owns one bit and leaves it in a known state.
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let ops = Arc::clone(&ops);
                thread::spawn(move || {
                    for _ in 0..500 {
                        ops.remove(Interest::READ).unwrap();
                        ops.add(Interest::READ).unwrap();
                    }
                })
            })
            .collect();
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let ops = Arc::clone(&ops);
                thread::spawn(move || {
                    for _ in 0..500 {
                        ops.add(Interest::WRITE).unwrap();
                        ops.remove(Interest::WRITE).unwrap();
                    }
                })
            })
            .collect();
        for t in readers.into_iter().chain(writers) {
            t.join().unwrap();
        }

        assert_eq!(ops.current(), Interest::READ);
    }

    #[test]
    fn test_cancelled_key_rejects_updates() {
        let (_client, server) = connected();
        let selector = Selector::new().unwrap();
        let key = selector
            .register(server.as_raw_fd(), Interest::READ, Arc::new(EstablishedContextStub))
            .unwrap();
        let ops = InterestOpsImpl::new(Arc::clone(&key));

        ops.cancel();
        ops.cancel();
        assert!(key.is_cancelled());
        assert!(selector.is_empty());
        assert!(matches!(ops.add(Interest::WRITE), Err(NetError::CancelledKey)));
        assert!(matches!(ops.remove(Interest::READ), Err(NetError::CancelledKey)));
        // Last applied set is still visible.
        assert_eq!(ops.current(), Interest::READ);
    }
}
