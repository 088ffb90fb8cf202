//! # evloop-core: trait definitions for evloop
//!
//! This crate defines the seams between the dispatch core and its
//! collaborators. Each trait models one capability the dispatcher
//! consumes without knowing the implementation behind it.
//!
//! | Trait           | Capability                               | Default impl (evloop-runtime) |
//! |-----------------|------------------------------------------|-------------------------------|
//! | Socket          | transport-abstracted connected channel   | PlainSocket                   |
//! | SocketFactory   | raw `TcpStream` → `Socket`               | PlainFactory                  |
//! | InterestOps     | cross-thread interest set mutation       | InterestOpsImpl               |
//! | TaskExecutor    | offload work from the dispatch thread    | FixedPool, InlineExecutor     |
//!
//! ## Design principle
//!
//! The dispatch thread only ever talks to these traits. Swapping a plain
//! transport for an encrypted one, or the worker pool for an inline
//! executor in tests, never touches the acceptance path.

pub mod env;
pub mod error;
pub mod executor;
pub mod interest;
pub mod interest_ops;
pub mod socket;

pub use error::{NetError, Result};
pub use executor::{Task, TaskExecutor};
pub use interest::Interest;
pub use interest_ops::InterestOps;
pub use socket::{Socket, SocketFactory};
