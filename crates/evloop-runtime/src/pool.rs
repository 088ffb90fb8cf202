//! `FixedPool`: default `TaskExecutor` implementation.
//!
//! Spawns N OS threads at creation. Workers dequeue boxed tasks from a
//! lock-free bounded queue and run them. `submit` pushes and unparks one
//! worker; an idle worker also wakes on its park timeout, so a missed
//! unpark costs at most one timeout.
//!
//! No dynamic scaling.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use tracing::{debug, error};

use evloop_core::{NetError, Result, Task, TaskExecutor};

use crate::config::PoolConfig;

/// Shared state between submitters and workers.
struct PoolInner {
    /// Work queue: dispatcher → workers.
    queue: ArrayQueue<Task>,
    /// Number of workers currently running a task.
    active: AtomicUsize,
    /// Round-robin cursor for unpark.
    next_wake: AtomicUsize,
    /// Shutdown flag.
    shutdown: AtomicBool,
    park_timeout: Duration,
}

pub struct FixedPool {
    inner: Arc<PoolInner>,
    threads: Vec<thread::Thread>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl FixedPool {
    /// Create a pool from `config`.
    pub fn new(config: &PoolConfig) -> Result<Self> {
        let n = config.effective_workers();
        let inner = Arc::new(PoolInner {
            queue: ArrayQueue::new(config.queue_depth.max(1)),
            active: AtomicUsize::new(0),
            next_wake: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            park_timeout: config.park_timeout,
        });

        let mut handles = Vec::with_capacity(n);
        for worker_id in 0..n {
            let inner = Arc::clone(&inner);
            let handle = thread::Builder::new()
                .name(format!("evloop-worker-{}", worker_id))
                .spawn(move || worker_loop(inner, worker_id))?;
            handles.push(handle);
        }
        let threads = handles.iter().map(|h| h.thread().clone()).collect();
        debug!(workers = n, queue_depth = config.queue_depth, "worker pool started");

        Ok(FixedPool {
            inner,
            threads,
            handles: Mutex::new(handles),
        })
    }

    pub fn active_workers(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    pub fn total_workers(&self) -> usize {
        self.threads.len()
    }

    /// Tasks waiting for a worker.
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// Shut down and wait for every worker to exit.
    pub fn join(&self) {
        self.shutdown();
        let current = thread::current().id();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            // The last reference can be dropped from inside a task.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("worker thread panicked outside a task");
            }
        }
    }
}

impl TaskExecutor for FixedPool {
    fn submit(&self, task: Task) -> Result<()> {
        if self.inner.shutdown.load(Ordering::Relaxed) {
            return Err(NetError::ExecutorUnavailable);
        }
        self.inner
            .queue
            .push(task)
            .map_err(|_| NetError::ExecutorUnavailable)?;
        let idx = self.inner.next_wake.fetch_add(1, Ordering::Relaxed) % self.threads.len();
        self.threads[idx].unpark();
        Ok(())
    }

    fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        for t in &self.threads {
            t.unpark();
        }
        debug!("worker pool shutting down");
    }
}

impl Drop for FixedPool {
    fn drop(&mut self) {
        self.join();
    }
}

/// Worker thread main loop.
fn worker_loop(inner: Arc<PoolInner>, worker_id: usize) {
    loop {
        if inner.shutdown.load(Ordering::Relaxed) {
            break;
        }

        match inner.queue.pop() {
            Some(task) => {
                inner.active.fetch_add(1, Ordering::Relaxed);
                // A panicking task must not take the worker down with it.
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!(worker_id, "task panicked");
                }
                inner.active.fetch_sub(1, Ordering::Relaxed);
            }
            None => thread::park_timeout(inner.park_timeout),
        }
    }
}

/// Runs every task synchronously in the caller.
///
/// Only for tests, blocks the dispatcher.
#[derive(Debug, Default)]
pub struct InlineExecutor {
    shutdown: AtomicBool,
}

impl InlineExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskExecutor for InlineExecutor {
    fn submit(&self, task: Task) -> Result<()> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(NetError::ExecutorUnavailable);
        }
        task();
        Ok(())
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
