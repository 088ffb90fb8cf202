//! `SelectionKey`: one channel's registration with a selector.

use std::fmt;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use evloop_core::{Interest, NetError, Result};

use super::{Selector, SelectorShared};
use crate::context::Context;

/// A registration: token + fd + interest set + attached context.
///
/// The interest set and the attachment are the only mutable parts. The
/// interest set is guarded by a mutex that is held across the matching
/// `epoll_ctl(MOD)`, so the kernel's view and `interest()` move together
/// and concurrent writers are serialized.
pub struct SelectionKey {
    token: u64,
    fd: RawFd,
    interest: Mutex<Interest>,
    attachment: RwLock<Option<Arc<dyn Context>>>,
    cancelled: AtomicBool,
    selector: Weak<SelectorShared>,
}

impl SelectionKey {
    pub(super) fn new(
        token: u64,
        fd: RawFd,
        interest: Interest,
        attachment: Arc<dyn Context>,
        selector: Weak<SelectorShared>,
    ) -> Self {
        Self {
            token,
            fd,
            interest: Mutex::new(interest),
            attachment: RwLock::new(Some(attachment)),
            cancelled: AtomicBool::new(false),
            selector,
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// The selector this key belongs to.
    pub fn selector(&self) -> Result<Selector> {
        self.selector
            .upgrade()
            .map(|shared| Selector { shared })
            .ok_or(NetError::SelectorClosed)
    }

    pub fn interest(&self) -> Interest {
        *self.interest.lock()
    }

    /// Apply `update` to the interest set and push the result to the
    /// kernel, atomically with respect to other updates on this key.
    pub fn update_interest<F>(&self, update: F) -> Result<Interest>
    where
        F: FnOnce(Interest) -> Interest,
    {
        let mut current = self.interest.lock();
        if self.is_cancelled() {
            return Err(NetError::CancelledKey);
        }
        let next = update(*current);
        if next != *current {
            let shared = self.selector.upgrade().ok_or(NetError::CancelledKey)?;
            shared.poller.modify(self.fd, next, self.token)?;
            trace!(token = self.token, from = %*current, to = %next, "interest updated");
            *current = next;
        }
        Ok(next)
    }

    /// Currently attached context, `None` once cancelled.
    pub fn attachment(&self) -> Option<Arc<dyn Context>> {
        self.attachment.read().clone()
    }

    /// Replace the attached context. Returns the previous one.
    ///
    /// Fails with `CancelledKey` if the key was cancelled; the new context
    /// is then not attached.
    pub fn attach(&self, context: Arc<dyn Context>) -> Result<Option<Arc<dyn Context>>> {
        let mut slot = self.attachment.write();
        if self.is_cancelled() {
            return Err(NetError::CancelledKey);
        }
        Ok(slot.replace(context))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Deregister from the selector and drop the attachment. Idempotent.
    ///
    /// Must run before the owning context closes its fd.
    pub fn cancel(&self) {
        let _interest = self.interest.lock();
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.selector.upgrade() {
            shared.keys.lock().remove(&self.token);
            if let Err(e) = shared.poller.delete(self.fd) {
                trace!(token = self.token, error = %e, "epoll delete on cancel");
            }
        }
        self.attachment.write().take();
        trace!(token = self.token, fd = self.fd, "key cancelled");
    }
}

impl fmt::Debug for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionKey")
            .field("token", &self.token)
            .field("fd", &self.fd)
            .field("interest", &self.interest())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
