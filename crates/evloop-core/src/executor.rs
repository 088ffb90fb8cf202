//! Task offload abstraction.
//!
//! The dispatch thread must never block, so anything potentially slow
//! (reading and processing a connection's payload, flushing writes) is
//! handed to a `TaskExecutor`.
//!
//! # Implementors
//!
//! - `FixedPool` (default): N OS threads pulling from a bounded
//!   lock-free queue.
//! - `InlineExecutor` (testing): runs the task synchronously in the
//!   caller. Only for unit tests, blocks the dispatcher.

use crate::error::Result;

/// A unit of offloaded work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks off the dispatch thread.
///
/// **Contract:**
/// - `submit()` must NEVER block the caller. If the executor cannot take
///   the task, it returns `Err(ExecutorUnavailable)`.
/// - Tasks may block (that's the whole point).
pub trait TaskExecutor: Send + Sync {
    /// Hand a task to the executor. Returns immediately.
    fn submit(&self, task: Task) -> Result<()>;

    /// Stop accepting tasks. Queued tasks may or may not run.
    fn shutdown(&self);
}
