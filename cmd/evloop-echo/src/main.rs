//! evloop Echo Server
//!
//! TCP echo server: one dispatch thread accepts and multiplexes every
//! connection over epoll, a fixed worker pool does the reads and writes.
//!
//! Usage:
//!     cargo build --release -p evloop-echo
//!     RUST_LOG=evloop_runtime=debug ./target/release/evloop-echo [port]
//!
//! Tuning (environment):
//!     EVLOOP_WORKERS, EVLOOP_QUEUE_DEPTH, EVLOOP_POLL_CAPACITY,
//!     EVLOOP_READ_BUFFER_SIZE, EVLOOP_IDLE_TIMEOUT_MS (0 = never)
//!
//! Test with:
//!     echo "hello" | nc localhost 9997

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use evloop_core::Result;
use evloop_runtime::{
    Clock, ConnectionConfig, Context, EstablishedContext, EventLoopConfig, EventLoopFactory, FixedPool,
    ListenContextFactory, PlainFactory, PoolConfig,
};

#[derive(Default)]
struct Stats {
    accepts: AtomicU64,
    bytes: AtomicU64,
    timeouts: AtomicU64,
}

/// Writes every chunk straight back to the peer.
struct EchoClock {
    ctx: Arc<EstablishedContext>,
    stats: Arc<Stats>,
}

impl Clock for EchoClock {
    fn advance(&mut self, bytes: &[u8]) -> Result<()> {
        self.stats.bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.ctx.egress().accept(bytes.to_vec())
    }

    fn on_timeout(&mut self) {
        self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
        debug!(peer = ?self.ctx.socket().peer_addr().ok(), "idle, closing");
        self.ctx.close();
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        error!(error = %e, "evloop-echo failed");
        std::process::exit(1);
    }
}

fn run() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(9997);

    let loop_config = EventLoopConfig::from_env();
    loop_config.validate()?;
    let pool_config = PoolConfig::from_env();
    pool_config.validate()?;
    let conn_config = ConnectionConfig::from_env();
    conn_config.validate()?;

    let pool = Arc::new(FixedPool::new(&pool_config)?);
    let event_loop = EventLoopFactory::new(loop_config).create()?;
    let stats = Arc::new(Stats::default());

    let clocks = {
        let stats = Arc::clone(&stats);
        move |ctx: &Arc<EstablishedContext>| -> Box<dyn Clock> {
            stats.accepts.fetch_add(1, Ordering::Relaxed);
            Box::new(EchoClock {
                ctx: Arc::clone(ctx),
                stats: Arc::clone(&stats),
            })
        }
    };
    let sockets = PlainFactory::new().nodelay(conn_config.tcp_nodelay);
    let listen = ListenContextFactory::new(pool.clone(), Arc::new(sockets), Arc::new(clocks))
        .connection_config(conn_config)
        .open(("0.0.0.0", port))?;
    event_loop.register(listen.clone())?;

    info!(
        addr = %listen.local_addr(),
        workers = pool.total_workers(),
        "evloop-echo ready"
    );

    let start = Instant::now();
    let reporter = Arc::clone(&stats);
    let workers = Arc::clone(&pool);
    thread::Builder::new()
        .name("evloop-stats".into())
        .spawn(move || loop {
            thread::sleep(Duration::from_secs(5));
            info!(
                uptime_s = start.elapsed().as_secs(),
                accepts = reporter.accepts.load(Ordering::Relaxed),
                bytes = reporter.bytes.load(Ordering::Relaxed),
                timeouts = reporter.timeouts.load(Ordering::Relaxed),
                busy_workers = workers.active_workers(),
                queued_tasks = workers.pending(),
                "stats"
            );
        })?;

    event_loop.run()?;
    event_loop.close();
    Ok(())
}
