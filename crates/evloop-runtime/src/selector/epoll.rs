//! Linux epoll backend for the selector.
//!
//! Level-triggered. Registrations carry their token in the event's `u64`
//! data word; the selector maps tokens back to keys.

use std::io;
use std::os::fd::{BorrowedFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags};

use evloop_core::Interest;

/// Buffer of raw readiness events filled by one wait.
pub struct Events {
    inner: Vec<EpollEvent>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: vec![EpollEvent::empty(); capacity.max(1)],
            len: 0,
        }
    }

    /// (token, readiness) pairs from the last wait.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (u64, Interest)> + '_ {
        self.inner[..self.len]
            .iter()
            .map(|ev| (ev.data(), readiness(ev.events())))
    }
}

/// Closed contexts report `-1`; reject it before it becomes a `BorrowedFd`.
fn borrow<'a>(fd: RawFd) -> io::Result<BorrowedFd<'a>> {
    if fd < 0 {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }
    // Safety: the fd is owned by the registering context and outlives
    // its registration (contexts cancel their key before closing).
    Ok(unsafe { BorrowedFd::borrow_raw(fd) })
}

pub(crate) struct Poller {
    epoll: Epoll,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).map_err(io::Error::from)?;
        Ok(Self { epoll })
    }

    pub fn add(&self, fd: RawFd, interest: Interest, token: u64) -> io::Result<()> {
        let fd = borrow(fd)?;
        self.epoll
            .add(fd, EpollEvent::new(flags(interest), token))
            .map_err(io::Error::from)
    }

    pub fn modify(&self, fd: RawFd, interest: Interest, token: u64) -> io::Result<()> {
        let fd = borrow(fd)?;
        let mut event = EpollEvent::new(flags(interest), token);
        self.epoll.modify(fd, &mut event).map_err(io::Error::from)
    }

    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        let fd = borrow(fd)?;
        self.epoll.delete(fd).map_err(io::Error::from)
    }

    /// Wait for readiness. EINTR is reported as zero events.
    pub fn wait(&self, events: &mut Events, timeout: Duration) -> io::Result<usize> {
        let ms = timeout.as_millis().min(u16::MAX as u128) as u16;
        match self.epoll.wait(&mut events.inner, ms) {
            Ok(n) => {
                events.len = n;
                Ok(n)
            }
            Err(Errno::EINTR) => {
                events.len = 0;
                Ok(0)
            }
            Err(e) => {
                events.len = 0;
                Err(io::Error::from(e))
            }
        }
    }
}

/// Interest → epoll flags. The empty set registers the fd with no
/// conditions at all.
fn flags(interest: Interest) -> EpollFlags {
    let mut flags = EpollFlags::empty();
    if interest.intersects(Interest::ACCEPT | Interest::READ) {
        flags |= EpollFlags::EPOLLIN;
    }
    if interest.is_readable() {
        flags |= EpollFlags::EPOLLRDHUP;
    }
    if interest.is_writable() {
        flags |= EpollFlags::EPOLLOUT;
    }
    flags
}

/// epoll flags → every readiness condition they could satisfy.
///
/// Errors and hang-ups map to READ | WRITE so the owner finds out through
/// its next read or write. The selector masks the result with the key's
/// interest set.
fn readiness(flags: EpollFlags) -> Interest {
    let mut ready = Interest::empty();
    if flags.contains(EpollFlags::EPOLLIN) {
        ready |= Interest::ACCEPT | Interest::READ;
    }
    if flags.contains(EpollFlags::EPOLLOUT) {
        ready |= Interest::WRITE;
    }
    if flags.intersects(EpollFlags::EPOLLERR | EpollFlags::EPOLLHUP | EpollFlags::EPOLLRDHUP) {
        ready |= Interest::READ | Interest::WRITE;
    }
    ready
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_mapping() {
        assert_eq!(flags(Interest::empty()), EpollFlags::empty());
        assert_eq!(flags(Interest::ACCEPT), EpollFlags::EPOLLIN);
        assert_eq!(
            flags(Interest::READ | Interest::WRITE),
            EpollFlags::EPOLLIN | EpollFlags::EPOLLRDHUP | EpollFlags::EPOLLOUT
        );
    }

    #[test]
    fn test_readiness_mapping() {
        assert_eq!(readiness(EpollFlags::EPOLLOUT), Interest::WRITE);
        assert!(readiness(EpollFlags::EPOLLIN).is_acceptable());
        assert!(readiness(EpollFlags::EPOLLIN).is_readable());
        let hup = readiness(EpollFlags::EPOLLHUP);
        assert!(hup.is_readable() && hup.is_writable());
        assert!(!hup.is_acceptable());
    }

    #[test]
    fn test_events_capacity() {
        let events = Events::with_capacity(0);
        assert_eq!(events.inner.len(), 1);
        assert_eq!(events.iter().count(), 0);
    }

    #[test]
    fn test_negative_fd_is_rejected() {
        let poller = Poller::new().unwrap();
        let err = poller.add(-1, Interest::READ, 7).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
        assert!(poller.modify(-1, Interest::READ, 7).is_err());
        assert!(poller.delete(-1).is_err());
    }
}
