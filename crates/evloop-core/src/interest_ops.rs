//! Interest-set handle abstraction.
//!
//! An `InterestOps` is bound to exactly one registered channel. It is the
//! only piece of per-connection dispatch state that may be touched from
//! more than one thread: the dispatch thread clears interests before it
//! offloads work, and the worker re-arms them when it is done.

use crate::error::Result;
use crate::interest::Interest;

/// Thread-safe mutation and query of one registration's interest set.
///
/// **Contract:**
/// - `add()` / `remove()` are linearizable: concurrent callers observe a
///   result equal to some sequential ordering of all calls. No update is
///   lost and none is observed half-applied.
/// - After `cancel()`, mutations return `Err(CancelledKey)`.
pub trait InterestOps: Send + Sync {
    /// Add `interest` to the set. Returns the new set.
    fn add(&self, interest: Interest) -> Result<Interest>;

    /// Remove `interest` from the set. Returns the new set.
    fn remove(&self, interest: Interest) -> Result<Interest>;

    /// Current interest set.
    fn current(&self) -> Interest;

    /// Deregister the channel from the dispatcher. Idempotent.
    fn cancel(&self);
}
