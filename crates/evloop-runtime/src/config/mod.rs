//! evloop configuration
//!
//! Provides library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls (programmatic)
//! 2. Environment variables (runtime)
//! 3. Library defaults ([`defaults`])
//!
//! # Example
//!
//! ```rust,ignore
//! use evloop_runtime::config::{EventLoopConfig, PoolConfig};
//!
//! let config = EventLoopConfig::from_env()
//!     .poll_capacity(256)
//!     .poll_timeout(Duration::from_millis(50));
//! config.validate()?;
//! ```

pub mod defaults;

use std::time::Duration;

use evloop_core::env::{env_get, env_get_bool, env_get_millis};

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct EventLoopConfig {
    /// Max readiness events drained per wait
    pub poll_capacity: usize,
    /// Upper bound on one wait
    pub poll_timeout: Duration,
    /// Interval between `on_tick` sweeps over registered contexts
    pub tick_interval: Duration,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl EventLoopConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `EVLOOP_POLL_CAPACITY` - Events per wait
    /// - `EVLOOP_POLL_TIMEOUT_MS` - Wait timeout in milliseconds
    /// - `EVLOOP_TICK_INTERVAL_MS` - Tick sweep interval in milliseconds
    pub fn from_env() -> Self {
        Self {
            poll_capacity: env_get("EVLOOP_POLL_CAPACITY", defaults::POLL_CAPACITY),
            poll_timeout: Duration::from_millis(env_get(
                "EVLOOP_POLL_TIMEOUT_MS",
                defaults::POLL_TIMEOUT_MS,
            )),
            tick_interval: Duration::from_millis(env_get(
                "EVLOOP_TICK_INTERVAL_MS",
                defaults::TICK_INTERVAL_MS,
            )),
        }
    }

    /// Create config with explicit defaults (no env override).
    pub fn new() -> Self {
        Self {
            poll_capacity: defaults::POLL_CAPACITY,
            poll_timeout: Duration::from_millis(defaults::POLL_TIMEOUT_MS),
            tick_interval: Duration::from_millis(defaults::TICK_INTERVAL_MS),
        }
    }

    pub fn poll_capacity(mut self, n: usize) -> Self {
        self.poll_capacity = n;
        self
    }

    pub fn poll_timeout(mut self, d: Duration) -> Self {
        self.poll_timeout = d;
        self
    }

    pub fn tick_interval(mut self, d: Duration) -> Self {
        self.tick_interval = d;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_capacity == 0 {
            return Err(ConfigError::InvalidValue("poll_capacity must be > 0"));
        }
        if self.poll_timeout > Duration::from_millis(u16::MAX as u64) {
            return Err(ConfigError::InvalidValue("poll_timeout must be <= 65535ms"));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue("tick_interval must be > 0"));
        }
        Ok(())
    }
}

/// Per-connection settings handed to every accepted connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bytes read per `read()`
    pub read_buffer_size: usize,
    /// Close-worthy idle period; `None` disables idle tracking
    pub idle_timeout: Option<Duration>,
    /// Set TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ConnectionConfig {
    /// Environment variables (all optional):
    /// - `EVLOOP_READ_BUFFER_SIZE` - Read chunk size in bytes
    /// - `EVLOOP_IDLE_TIMEOUT_MS` - Idle timeout, 0 disables
    /// - `EVLOOP_TCP_NODELAY` - Set TCP_NODELAY (0/1)
    pub fn from_env() -> Self {
        Self {
            read_buffer_size: env_get("EVLOOP_READ_BUFFER_SIZE", defaults::READ_BUFFER_SIZE),
            idle_timeout: env_get_millis("EVLOOP_IDLE_TIMEOUT_MS", defaults::IDLE_TIMEOUT_MS),
            tcp_nodelay: env_get_bool("EVLOOP_TCP_NODELAY", defaults::TCP_NODELAY),
        }
    }

    pub fn new() -> Self {
        Self {
            read_buffer_size: defaults::READ_BUFFER_SIZE,
            idle_timeout: None,
            tcp_nodelay: defaults::TCP_NODELAY,
        }
    }

    pub fn read_buffer_size(mut self, n: usize) -> Self {
        self.read_buffer_size = n;
        self
    }

    pub fn idle_timeout(mut self, d: Option<Duration>) -> Self {
        self.idle_timeout = d;
        self
    }

    pub fn tcp_nodelay(mut self, enable: bool) -> Self {
        self.tcp_nodelay = enable;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_buffer_size == 0 {
            return Err(ConfigError::InvalidValue("read_buffer_size must be > 0"));
        }
        if matches!(self.idle_timeout, Some(d) if d.is_zero()) {
            return Err(ConfigError::InvalidValue("idle_timeout must be > 0 when set"));
        }
        Ok(())
    }
}

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker threads; 0 = auto
    pub workers: usize,
    /// Pending tasks before `submit` fails
    pub queue_depth: usize,
    /// Idle worker park timeout
    pub park_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PoolConfig {
    /// Environment variables (all optional):
    /// - `EVLOOP_WORKERS` - Worker threads, 0 = auto
    /// - `EVLOOP_QUEUE_DEPTH` - Task queue capacity
    /// - `EVLOOP_PARK_TIMEOUT_MS` - Idle park timeout in milliseconds
    pub fn from_env() -> Self {
        Self {
            workers: env_get("EVLOOP_WORKERS", defaults::WORKERS),
            queue_depth: env_get("EVLOOP_QUEUE_DEPTH", defaults::QUEUE_DEPTH),
            park_timeout: Duration::from_millis(env_get(
                "EVLOOP_PARK_TIMEOUT_MS",
                defaults::PARK_TIMEOUT_MS,
            )),
        }
    }

    pub fn new() -> Self {
        Self {
            workers: defaults::WORKERS,
            queue_depth: defaults::QUEUE_DEPTH,
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
        }
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn queue_depth(mut self, n: usize) -> Self {
        self.queue_depth = n;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    /// Resolve `workers == 0` to min(8, nproc/2), at least 2.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cpus / 2).clamp(2, 8)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers > 256 {
            return Err(ConfigError::InvalidValue("workers must be <= 256"));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::InvalidValue("queue_depth must be > 0"));
        }
        Ok(())
    }
}

/// Configuration error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidValue(&'static str),
}
