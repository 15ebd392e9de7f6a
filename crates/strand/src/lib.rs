//! # strand — a fiber-based JSON-RPC runtime
//!
//! Userspace RPC plumbing built on cooperative stackful fibers:
//!
//! - **Scheduler**: N worker threads, each a single-threaded event loop
//!   over fibers (epoll + deadline heap + ready queue). No preemption.
//! - **Fiber sync**: `FiberMutex`, `FiberRwLock`, `FiberCondvar` park
//!   fibers and wake them through eventfds, across workers.
//! - **I/O**: non-blocking sockets behind fixed ring buffers with
//!   per-operation timeouts; blocking points suspend the fiber only.
//! - **Codec**: a recursive, type-directed JSON codec that parses
//!   straight off the socket ring, plus `#[derive(Encode, Decode)]`
//!   for user records.
//! - **RPC**: JSON-RPC 2.0 framing, a method router and a
//!   connection-per-fiber server.
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use strand::rpc::{RpcServer, ServerConfig, ServerRouter};
//! use strand::{Runtime, RuntimeConfig};
//!
//! fn main() -> strand::SchedResult<()> {
//!     let runtime = Runtime::new(RuntimeConfig::default())?;
//!     runtime.start()?;
//!
//!     let mut router = ServerRouter::new();
//!     router.add_method("sum", |(values,): (Vec<i64>,)| {
//!         Ok(values.into_iter().sum::<i64>())
//!     });
//!
//!     let server = RpcServer::bind(
//!         "127.0.0.1:9998".parse().unwrap(),
//!         Arc::new(router),
//!         ServerConfig::default(),
//!     )
//!     .unwrap();
//!     server.start()?;
//!
//!     loop {
//!         std::thread::park();
//!     }
//! }
//! ```

// Lets the derive macros refer to `::strand::...` from inside this
// crate as well as from dependents.
extern crate self as strand;

pub mod codec;
pub mod rpc;

pub use strand_net as net;

pub use strand_core::{
    log_debug, log_error, log_info, log_trace, log_warn, CancelToken, FiberId, FiberState,
    LogLevel, SchedError, SchedResult, SpinLock, WakeCause, YieldReason,
};
pub use strand_net::{
    MemReadBuffer, MemWriteBuffer, NetError, NetResult, ReadBuffer, ReadRingBuffer, TcpListener,
    TcpSocket, WriteBuffer, WriteRingBuffer,
};
pub use strand_runtime::{
    cancel_fiber, current_id, in_fiber, scheduler, sleep, spawn, yield_now, FiberCondvar,
    FiberMutex, FiberMutexGuard, FiberRwLock, RuntimeConfig, Scheduler,
};

pub use codec::{Decode, Encode, JsonDeserializer, JsonSerializer, Pair};
pub use strand_macro::{Decode, Encode};

use std::sync::atomic::{AtomicBool, Ordering};

/// Handle tying the scheduler lifecycle to a value.
///
/// `new` initializes the global scheduler, `start` spins up the
/// workers, and dropping the handle (or calling `shutdown`) stops
/// them. Parked fibers are dropped on shutdown without resuming.
pub struct Runtime {
    started: AtomicBool,
}

impl Runtime {
    /// Initialize the global scheduler with `config`.
    pub fn new(config: RuntimeConfig) -> SchedResult<Self> {
        scheduler::init(config)?;
        Ok(Self {
            started: AtomicBool::new(false),
        })
    }

    /// Start the worker threads.
    pub fn start(&self) -> SchedResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedError::AlreadyRunning);
        }
        scheduler::global()
            .ok_or(SchedError::NotRunning)?
            .start()
    }

    /// Start, run `f` on the calling thread, then shut down.
    pub fn block_on<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _ = self.start();
        let result = f();
        self.shutdown();
        result
    }

    /// Spawn a fiber.
    pub fn spawn<F>(&self, f: F) -> SchedResult<FiberId>
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        spawn(f)
    }

    /// Stop the workers and join them. Must not be called from a
    /// fiber.
    pub fn shutdown(&self) {
        if self.started.swap(false, Ordering::SeqCst) {
            if let Some(sched) = scheduler::global() {
                sched.shutdown();
            }
        }
    }

    /// The underlying scheduler handle.
    pub fn scheduler(&self) -> Option<&'static Scheduler> {
        scheduler::global()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
