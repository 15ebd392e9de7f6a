//! Fiber-level synchronization
//!
//! These primitives park fibers instead of OS threads. Blocked fibers
//! sit on a FIFO wait queue guarded by a spinlock; wakes travel through
//! an eventfd registered with the scheduler, so a release on one worker
//! resumes a waiter on another without touching its stack.

mod condvar;
mod mutex;
mod rwlock;

pub use condvar::FiberCondvar;
pub use mutex::{FiberMutex, FiberMutexGuard};
pub use rwlock::{FiberRwLock, FiberRwLockReadGuard, FiberRwLockWriteGuard};
