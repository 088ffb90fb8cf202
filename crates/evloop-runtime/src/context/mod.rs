//! # Contexts: what a registration dispatches to
//!
//! Every [`SelectionKey`](crate::selector::SelectionKey) carries exactly one
//! attached [`Context`]. The dispatcher calls `handle_event` on it when the
//! key reports readiness. Three variants exist:
//!
//! | Variant                  | Channel     | Lifetime                         |
//! |--------------------------|-------------|----------------------------------|
//! | `ListenContext`          | listening   | bound address, until shutdown    |
//! | `EstablishedContext`     | connected   | one accepted connection          |
//! | `EstablishedContextStub` | none        | between register and attach only |
//!
//! ## Two-phase attach
//!
//! A registration needs an attachment, and an `EstablishedContext` needs
//! its registration (for its interest handle). The accept path breaks the
//! cycle by registering with the stub and the empty interest set,
//! building the real context from the key, then swapping it in:
//!
//! ```text
//!  accept ─► register(fd, ∅, stub) ─► InterestOpsImpl(key)
//!        ─► EstablishedContext ─► key.attach(ctx) ─► ingress.register(clock)
//! ```

mod established;
mod factory;
mod listen;
mod stub;

pub use established::EstablishedContext;
pub use factory::ListenContextFactory;
pub use listen::ListenContext;
pub use stub::EstablishedContextStub;

use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Instant;

use evloop_core::{Interest, Result};

use crate::selector::{ReadyEvent, SelectionKey};

/// Handler bound to one registration.
///
/// Called from the dispatch thread only, strictly sequentially. No method
/// may block.
pub trait Context: Send + Sync {
    /// React to readiness. `Err` is fatal to this event only; the event
    /// loop logs it and keeps running.
    fn handle_event(&self, event: &ReadyEvent) -> Result<()>;

    /// Release the channel. Idempotent, never fails.
    fn close(&self);

    /// The OS channel this context owns.
    fn channel_fd(&self) -> RawFd;

    /// Interest set to register with.
    fn initial_interest(&self) -> Interest;

    /// Called once the context's own registration exists.
    fn on_register(&self, _key: &Arc<SelectionKey>) {}

    /// Periodic bookkeeping (idle timeouts). Called on the dispatch thread.
    fn on_tick(&self, _now: Instant) {}
}
