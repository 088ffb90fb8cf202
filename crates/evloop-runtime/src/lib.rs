//! # evloop-runtime
//!
//! Linux implementation of the evloop dispatch core.
//!
//! This crate provides:
//! - An epoll selector with thread-safe selection keys
//! - The single-threaded event loop that drives every context
//! - The accept path (`ListenContext`) and live connections
//!   (`EstablishedContext`) with their ingress/egress halves
//! - A fixed worker pool for offloaded connection work
//! - A plain TCP socket factory
//!
//! ```text
//!  EventLoop ── select ──► ListenContext ── accept ──► SocketFactory
//!      │                        │
//!      │                        └─ register(∅, stub) ─► attach(EstablishedContext)
//!      │                                                   │
//!      └── select ──► EstablishedContext ── submit ──► FixedPool
//!                                                   ├─ Ingress ─► Clock
//!                                                   └─ Egress
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod egress;
pub mod event_loop;
pub mod ingress;
pub mod interest_ops;
pub mod pool;
pub mod selector;
pub mod socket;

// Re-exports
pub use clock::{Clock, ClockFactory};
pub use config::{ConfigError, ConnectionConfig, EventLoopConfig, PoolConfig};
pub use context::{
    Context, EstablishedContext, EstablishedContextStub, ListenContext, ListenContextFactory,
};
pub use event_loop::{EventLoop, EventLoopFactory};
pub use interest_ops::InterestOpsImpl;
pub use pool::{FixedPool, InlineExecutor};
pub use selector::{Events, ReadyEvent, SelectionKey, Selector};
pub use socket::{PlainFactory, PlainSocket};
