//! Library defaults. Every value can be overridden from the environment
//! (see [`EventLoopConfig::from_env`](super::EventLoopConfig::from_env)).

/// Max readiness events drained per `epoll_wait`.
pub const POLL_CAPACITY: usize = 1024;

/// Upper bound on one `epoll_wait` in milliseconds.
pub const POLL_TIMEOUT_MS: u64 = 100;

/// How often contexts get an `on_tick` in milliseconds.
pub const TICK_INTERVAL_MS: u64 = 1000;

/// Bytes read per `read()` on a connection.
pub const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Idle connection timeout in milliseconds. 0 disables it.
pub const IDLE_TIMEOUT_MS: u64 = 0;

/// Set TCP_NODELAY on accepted sockets.
pub const TCP_NODELAY: bool = true;

/// Worker pool size. 0 means auto: min(8, nproc/2), at least 2.
pub const WORKERS: usize = 0;

/// Pending tasks before `submit` fails.
pub const QUEUE_DEPTH: usize = 4096;

/// Worker park timeout when the queue is empty, in milliseconds.
pub const PARK_TIMEOUT_MS: u64 = 10;
