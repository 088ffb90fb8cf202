//! # Selector: the readiness mechanism
//!
//! A `Selector` multiplexes readiness over many channels. Each
//! registration produces a [`SelectionKey`] that carries the channel's
//! interest set and the [`Context`] attached to it.
//!
//! ```text
//!   register(fd, interest, ctx) ──► SelectionKey ──► keys[token]
//!                                        │
//!                                        ▼
//!   select(timeout) ── epoll_wait ──► token ──► (key, ready ∩ interest)
//! ```
//!
//! `register`, `wakeup`, `close` and every `SelectionKey` method are safe
//! to call from any thread. `select` is meant for the single dispatch
//! thread.

mod key;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod epoll;
        use epoll::Poller;
        pub use epoll::Events;
    } else {
        compile_error!("Unsupported platform: evloop requires epoll (Linux)");
    }
}

mod waker;

pub use key::SelectionKey;

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use evloop_core::{Interest, NetError, Result};

use crate::context::Context;
use waker::Waker;

/// Reserved token for the waker's eventfd.
const WAKER_TOKEN: u64 = u64::MAX;

pub(crate) struct SelectorShared {
    poller: Poller,
    waker: Waker,
    keys: Mutex<HashMap<u64, Arc<SelectionKey>>>,
    next_token: AtomicU64,
    closed: AtomicBool,
}

/// One readiness notification: the key and the conditions that are ready
/// (already masked with the key's interest set).
#[derive(Debug, Clone)]
pub struct ReadyEvent {
    key: Arc<SelectionKey>,
    ready: Interest,
}

impl ReadyEvent {
    pub fn new(key: Arc<SelectionKey>, ready: Interest) -> Self {
        Self { key, ready }
    }

    pub fn key(&self) -> &Arc<SelectionKey> {
        &self.key
    }

    pub fn ready(&self) -> Interest {
        self.ready
    }

    pub fn is_acceptable(&self) -> bool {
        self.ready.is_acceptable()
    }

    pub fn is_readable(&self) -> bool {
        self.ready.is_readable()
    }

    pub fn is_writable(&self) -> bool {
        self.ready.is_writable()
    }
}

/// Cloneable handle to a selector.
#[derive(Clone)]
pub struct Selector {
    shared: Arc<SelectorShared>,
}

impl Selector {
    pub fn new() -> Result<Self> {
        let poller = Poller::new()?;
        let waker = Waker::new()?;
        poller.add(waker.fd(), Interest::READ, WAKER_TOKEN)?;
        Ok(Self {
            shared: Arc::new(SelectorShared {
                poller,
                waker,
                keys: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Register `fd` with `interest` and `attachment`.
    ///
    /// The fd must stay open until the returned key is cancelled. Fails
    /// with `SelectorClosed` once the selector has been closed.
    pub fn register(
        &self,
        fd: RawFd,
        interest: Interest,
        attachment: Arc<dyn Context>,
    ) -> Result<Arc<SelectionKey>> {
        let token = self.shared.next_token.fetch_add(1, Ordering::Relaxed);
        let key = Arc::new(SelectionKey::new(
            token,
            fd,
            interest,
            attachment,
            Arc::downgrade(&self.shared),
        ));

        // `close()` drains under the same lock: either it sees this key,
        // or this sees `closed`.
        let mut keys = self.shared.keys.lock();
        if self.is_closed() {
            return Err(NetError::SelectorClosed);
        }
        self.shared.poller.add(fd, interest, token)?;
        keys.insert(token, Arc::clone(&key));
        trace!(token, fd, %interest, "registered");
        Ok(key)
    }

    /// Wait up to `timeout` for readiness and resolve it to keys.
    ///
    /// Cancelled keys and conditions outside a key's interest set are
    /// filtered out, so a key registered with the empty set never shows up.
    pub fn select(&self, events: &mut Events, timeout: Duration) -> Result<Vec<ReadyEvent>> {
        if self.is_closed() {
            return Err(NetError::SelectorClosed);
        }
        self.shared.poller.wait(events, timeout)?;

        // Resolve tokens under the map lock, read interest sets after
        // releasing it (key locks nest outside the map lock).
        let resolved: Vec<(Arc<SelectionKey>, Interest)> = {
            let keys = self.shared.keys.lock();
            events
                .iter()
                .filter_map(|(token, readiness)| {
                    if token == WAKER_TOKEN {
                        self.shared.waker.drain();
                        return None;
                    }
                    keys.get(&token).map(|key| (Arc::clone(key), readiness))
                })
                .collect()
        };

        let mut ready = Vec::with_capacity(resolved.len());
        for (key, readiness) in resolved {
            let masked = readiness & key.interest();
            if masked.is_empty() || key.is_cancelled() {
                continue;
            }
            ready.push(ReadyEvent::new(key, masked));
        }
        Ok(ready)
    }

    /// Interrupt a blocked `select` from another thread.
    pub fn wakeup(&self) -> Result<()> {
        self.shared.waker.wake()?;
        Ok(())
    }

    /// Snapshot of the live keys.
    pub fn keys(&self) -> Vec<Arc<SelectionKey>> {
        self.shared.keys.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shared.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Cancel every key and refuse further registrations. Idempotent.
    ///
    /// Contexts are not closed here; see `EventLoop::close`.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut keys = self.shared.keys.lock();
            if self.shared.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            keys.drain().map(|(_, key)| key).collect()
        };
        debug!(keys = drained.len(), "selector closing");
        for key in drained {
            key.cancel();
        }
        let _ = self.shared.waker.wake();
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("keys", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
