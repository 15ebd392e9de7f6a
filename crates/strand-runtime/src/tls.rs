//! Thread-local scheduler state
//!
//! Fast access to the current worker id, the worker's scheduler-side
//! context save area, and the fiber currently running on this thread.

use crate::arch::SavedContext;
use crate::fiber::Fiber;
use std::cell::Cell;
use strand_core::FiberId;

thread_local! {
    /// Worker index of this OS thread (usize::MAX off the pool).
    static WORKER_ID: Cell<usize> = const { Cell::new(usize::MAX) };

    /// Where this worker's loop saves its own context during a switch.
    static SCHED_CTX: Cell<*mut SavedContext> = const { Cell::new(std::ptr::null_mut()) };

    /// Fiber currently running on this thread.
    static CURRENT: Cell<*const Fiber> = const { Cell::new(std::ptr::null()) };
}

#[inline]
pub fn set_worker_id(id: usize) {
    WORKER_ID.with(|c| c.set(id));
}

#[inline]
pub fn worker_id() -> usize {
    WORKER_ID.with(|c| c.get())
}

#[inline]
pub(crate) fn set_sched_ctx(ptr: *mut SavedContext) {
    SCHED_CTX.with(|c| c.set(ptr));
}

#[inline]
pub(crate) fn sched_ctx() -> *mut SavedContext {
    SCHED_CTX.with(|c| c.get())
}

#[inline]
pub(crate) fn set_current(fiber: *const Fiber) {
    CURRENT.with(|c| c.set(fiber));
}

#[inline]
pub(crate) fn clear_current() {
    CURRENT.with(|c| c.set(std::ptr::null()));
}

/// Run `f` against the current fiber, if any.
///
/// The reference handed to `f` must not escape the closure; the pointer
/// is only valid while the fiber occupies this thread.
#[inline]
pub(crate) fn with_current<R>(f: impl FnOnce(&Fiber) -> R) -> Option<R> {
    let ptr = CURRENT.with(|c| c.get());
    if ptr.is_null() {
        None
    } else {
        // Safety: set_current is only called by the worker while the
        // registry holds a strong reference and the fiber runs here.
        Some(f(unsafe { &*ptr }))
    }
}

/// Id of the fiber running on this thread, if any.
#[inline]
pub fn current_fiber_id() -> Option<FiberId> {
    with_current(|f| f.id())
}

/// Whether this call happens on a fiber stack.
#[inline]
pub fn in_fiber() -> bool {
    CURRENT.with(|c| !c.get().is_null())
}
