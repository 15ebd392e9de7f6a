//! Fiber control block
//!
//! A fiber is an identity, a state machine, an owned stack, a saved
//! machine context and a boxed entry closure. All cross-thread
//! coordination happens through the atomics; the context, stack and
//! entry are only ever touched by the worker the fiber is bound to.

use crate::arch::{self, SavedContext};
use crate::stack::FiberStack;
use std::cell::UnsafeCell;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use strand_core::{log_error, CancelToken, FiberId, FiberState, SchedResult, WakeCause, YieldReason};

/// Sentinel for "not yet bound to a worker".
pub const NO_WORKER: usize = usize::MAX;

type Entry = Box<dyn FnOnce(&CancelToken) + Send + 'static>;

pub struct Fiber {
    id: FiberId,
    state: AtomicU8,
    /// Worker index this fiber is bound to; `NO_WORKER` until admitted.
    owner: AtomicUsize,
    yield_reason: AtomicU8,
    wake_cause: AtomicU8,
    /// Directed-wake token. Set by wakers, consumed by the owner worker
    /// or by the park prologue; closes the enqueue-then-park window.
    wake_pending: AtomicBool,
    /// Bumped on every park; stale timer entries fail the comparison.
    park_seq: AtomicU64,
    token: CancelToken,
    ctx: UnsafeCell<SavedContext>,
    #[allow(dead_code)]
    stack: FiberStack,
    entry: UnsafeCell<Option<Entry>>,
}

// Safety: `ctx`, `stack` and `entry` are only accessed by the worker
// currently running or resuming the fiber; a fiber is bound to at most
// one worker and one worker runs one fiber at a time. Everything else
// is atomic.
unsafe impl Send for Fiber {}
unsafe impl Sync for Fiber {}

impl Fiber {
    /// Build a READY fiber with its stack and initial context.
    pub fn new<F>(id: FiberId, stack_size: usize, f: F) -> SchedResult<Arc<Fiber>>
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        let stack = FiberStack::alloc(stack_size)?;
        let stack_top = stack.top();

        let fiber = Arc::new(Fiber {
            id,
            state: AtomicU8::new(FiberState::Ready as u8),
            owner: AtomicUsize::new(NO_WORKER),
            yield_reason: AtomicU8::new(YieldReason::Cooperative as u8),
            wake_cause: AtomicU8::new(WakeCause::Wake as u8),
            wake_pending: AtomicBool::new(false),
            park_seq: AtomicU64::new(0),
            token: CancelToken::new(),
            ctx: UnsafeCell::new(SavedContext::zeroed()),
            stack,
            entry: UnsafeCell::new(Some(Box::new(f))),
        });

        // The trampoline argument is a raw Arc; fiber_main reclaims it.
        let raw = Arc::into_raw(Arc::clone(&fiber)) as usize;
        unsafe {
            arch::init_context(fiber.ctx.get(), stack_top, fiber_main, raw);
        }
        Ok(fiber)
    }

    #[inline]
    pub fn id(&self) -> FiberId {
        self.id
    }

    #[inline]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    #[inline]
    pub fn state(&self) -> FiberState {
        FiberState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_state(&self, s: FiberState) {
        self.state.store(s as u8, Ordering::Release);
    }

    #[inline]
    pub fn owner(&self) -> usize {
        self.owner.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_owner(&self, worker: usize) {
        self.owner.store(worker, Ordering::Release);
    }

    #[inline]
    pub fn yield_reason(&self) -> YieldReason {
        YieldReason::from(self.yield_reason.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_yield_reason(&self, r: YieldReason) {
        self.yield_reason.store(r as u8, Ordering::Release);
    }

    #[inline]
    pub fn wake_cause(&self) -> WakeCause {
        WakeCause::from(self.wake_cause.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_wake_cause(&self, c: WakeCause) {
        self.wake_cause.store(c as u8, Ordering::Release);
    }

    /// Post a directed wake token.
    #[inline]
    pub fn set_wake_pending(&self) {
        self.wake_pending.store(true, Ordering::SeqCst);
    }

    /// Consume the wake token if present.
    #[inline]
    pub fn consume_wake(&self) -> bool {
        self.wake_pending.swap(false, Ordering::SeqCst)
    }

    /// Invalidate all timer entries from earlier parks. Returns the new
    /// sequence number to stamp onto this park's registrations.
    #[inline]
    pub fn bump_park_seq(&self) -> u64 {
        self.park_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    #[inline]
    pub fn park_seq(&self) -> u64 {
        self.park_seq.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn ctx_ptr(&self) -> *mut SavedContext {
        self.ctx.get()
    }
}

impl std::fmt::Debug for Fiber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("owner", &self.owner())
            .finish()
    }
}

/// Entry point executed on the fiber's own stack.
///
/// `arg` is the raw `Arc<Fiber>` stashed by `Fiber::new`. Runs the user
/// closure, then hands the stack back to the scheduler for good.
pub(crate) extern "C" fn fiber_main(arg: usize) {
    // Safety: arg is the pointer produced by Arc::into_raw in Fiber::new
    // and is consumed exactly once, here.
    let fiber = unsafe { Arc::from_raw(arg as *const Fiber) };

    // Safety: we are the bound worker; the entry is taken exactly once.
    let entry = unsafe { (*fiber.entry.get()).take() };
    if let Some(f) = entry {
        let token = fiber.token().clone();
        let id = fiber.id();
        // Release our Arc before the closure runs so a long-lived fiber
        // does not pin its own control block beyond the registry's.
        drop(fiber);
        if std::panic::catch_unwind(AssertUnwindSafe(|| f(&token))).is_err() {
            log_error!("fiber {} panicked; terminating it", id);
        }
    }

    crate::scheduler::finish_current();
}
