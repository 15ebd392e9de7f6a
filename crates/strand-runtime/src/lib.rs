//! # strand-runtime
//!
//! Cooperative fiber scheduler: stackful fibers over mmap'd stacks,
//! N worker threads each running a single-threaded event loop (epoll +
//! deadline heap + ready queue), and fiber-level synchronization
//! primitives that park fibers on eventfd wake sources.
//!
//! There is no preemption. A fiber runs until it yields, parks or
//! terminates; the suspension points are exactly `yield_now`, socket
//! I/O that would block, contended `FiberMutex`/`FiberRwLock`
//! acquisition, `FiberCondvar::wait`, `sleep`, and fiber entry/exit.
//!
//! ```ignore
//! use strand_runtime::{scheduler, RuntimeConfig};
//!
//! scheduler::init(RuntimeConfig::default())?.start()?;
//! scheduler::spawn(|_token| {
//!     println!("hello from a fiber");
//!     scheduler::yield_now();
//! })?;
//! ```

mod arch;
pub mod config;
mod fiber;
pub mod poller;
pub mod scheduler;
mod stack;
pub mod sync;
mod timer;
pub mod tls;
mod waker;
mod worker;

pub use config::RuntimeConfig;
pub use poller::Interest;
pub use scheduler::{
    cancel_fiber, current_id, in_fiber, park_deadline, park_fd, park_queue, sleep, spawn,
    yield_now, Scheduler,
};
pub use sync::{
    FiberCondvar, FiberMutex, FiberMutexGuard, FiberRwLock, FiberRwLockReadGuard,
    FiberRwLockWriteGuard,
};
