//! Worker threads
//!
//! Each worker runs the event loop from the scheduler's contract:
//! (1) wait on its epoll instance with a timeout set by the nearest
//! armed deadline, (2) drain readiness events, remote wakes and fired
//! timers into the local ready queue, (3) pop one READY fiber and
//! resume it, (4) repeat when it yields. A fiber stays on the worker
//! that first admitted it; cross-thread wakes go through the worker's
//! remote queue plus its waker eventfd.

use crate::arch::{self, SavedContext};
use crate::poller::{Interest, Poller};
use crate::scheduler::Scheduler;
use crate::timer::DeadlineHeap;
use crate::tls;
use crate::waker::WakerFd;
use crossbeam_queue::ArrayQueue;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::time::Instant;
use strand_core::{log_debug, log_error, log_warn};
use strand_core::{FiberId, FiberState, WakeCause};

/// Event payload of the worker's own waker eventfd.
pub(crate) const WAKER_TOKEN: u64 = u64::MAX;

/// Cross-thread-visible half of a worker.
pub(crate) struct WorkerShared {
    /// Fiber ids posted by spawners and wakers on other threads.
    pub(crate) remote: ArrayQueue<u64>,
    /// Kicks the worker out of `epoll_wait` when the queue fills.
    pub(crate) waker: WakerFd,
}

impl WorkerShared {
    pub(crate) fn new(queue_capacity: usize) -> strand_core::SchedResult<Self> {
        Ok(Self {
            remote: ArrayQueue::new(queue_capacity),
            waker: WakerFd::create()?,
        })
    }
}

/// Worker-local half: poll set, deadline heap, ready queue.
pub(crate) struct WorkerCtx {
    pub(crate) poller: Poller,
    pub(crate) timers: DeadlineHeap,
    pub(crate) ready: VecDeque<FiberId>,
}

thread_local! {
    static CTX: RefCell<Option<WorkerCtx>> = const { RefCell::new(None) };
}

/// Run `f` against this worker's local state.
///
/// Panics off the worker pool, and on re-entry; callers must not hold
/// the borrow across a context switch.
pub(crate) fn with_ctx<R>(f: impl FnOnce(&mut WorkerCtx) -> R) -> R {
    CTX.with(|c| {
        let mut slot = c.borrow_mut();
        let ctx = slot.as_mut().expect("not on a strand worker thread");
        f(ctx)
    })
}

/// Worker thread entry.
pub(crate) fn worker_main(sched: &'static Scheduler, worker_id: usize) {
    tls::set_worker_id(worker_id);

    let mut sched_ctx = Box::new(SavedContext::zeroed());
    tls::set_sched_ctx(&mut *sched_ctx);

    let ctx = match WorkerCtx::init(sched, worker_id) {
        Ok(ctx) => ctx,
        Err(e) => {
            log_error!("worker {} failed to initialize: {}", worker_id, e);
            return;
        }
    };
    CTX.with(|c| *c.borrow_mut() = Some(ctx));
    log_debug!("worker {} started", worker_id);

    loop {
        let has_ready = with_ctx(|c| !c.ready.is_empty());
        if !sched.is_running() && !has_ready {
            break;
        }

        let timeout_ms = if has_ready {
            0
        } else {
            with_ctx(|c| c.timers.next_deadline())
                .map(|d| {
                    let now = Instant::now();
                    if d <= now {
                        0
                    } else {
                        // Round up so we never wake a hair early and spin.
                        ((d - now).as_millis() as i64 + 1).min(i32::MAX as i64) as i32
                    }
                })
                .unwrap_or(-1)
        };

        poll_once(sched, worker_id, timeout_ms);

        if let Some(id) = with_ctx(|c| c.ready.pop_front()) {
            run_fiber(sched, id);
        }
    }

    CTX.with(|c| *c.borrow_mut() = None);
    tls::set_sched_ctx(std::ptr::null_mut());
    log_debug!("worker {} stopped", worker_id);
}

impl WorkerCtx {
    fn init(sched: &'static Scheduler, worker_id: usize) -> strand_core::SchedResult<Self> {
        let poller = Poller::new(sched.config().poll_batch)?;
        poller.add_persistent(sched.worker(worker_id).waker.fd(), WAKER_TOKEN)?;
        Ok(Self {
            poller,
            timers: DeadlineHeap::new(),
            ready: VecDeque::new(),
        })
    }
}

/// One pass of steps (1) and (2): wait, then file every wake into the
/// ready queue.
fn poll_once(sched: &'static Scheduler, worker_id: usize, timeout_ms: i32) {
    let n = with_ctx(|c| c.poller.wait(timeout_ms));

    for i in 0..n {
        let (data, bits) = with_ctx(|c| c.poller.event(i));
        if data == WAKER_TOKEN {
            let shared = sched.worker(worker_id);
            shared.waker.drain();
            while let Some(raw) = shared.remote.pop() {
                admit(sched, worker_id, FiberId::new(raw));
            }
        } else {
            let fd = data as RawFd;
            let wait = with_ctx(|c| c.poller.complete(fd, bits));
            if let Some(w) = wait {
                if let Some(fiber) = sched.get(w.fiber) {
                    if fiber.state() == FiberState::Blocked && fiber.park_seq() == w.seq {
                        fiber.set_wake_cause(match w.interest {
                            Interest::Readable => WakeCause::Readable,
                            Interest::Writable => WakeCause::Writable,
                        });
                        fiber.set_state(FiberState::Ready);
                        with_ctx(|c| c.ready.push_back(w.fiber));
                    }
                }
            }
        }
    }

    let now = Instant::now();
    loop {
        let Some(t) = with_ctx(|c| c.timers.pop_expired(now)) else {
            break;
        };
        let Some(fiber) = sched.get(t.fiber) else {
            continue;
        };
        // Stale entries (fd won the race, or the fiber re-parked) fail
        // the sequence check and fall through.
        if fiber.state() == FiberState::Blocked && fiber.park_seq() == t.seq {
            if let Some(fd) = t.fd {
                with_ctx(|c| {
                    c.poller.remove(fd, t.fiber);
                });
            }
            fiber.set_wake_cause(WakeCause::Deadline);
            fiber.set_state(FiberState::Ready);
            with_ctx(|c| c.ready.push_back(t.fiber));
        }
    }
}

/// File a fiber arriving over the remote queue.
fn admit(sched: &'static Scheduler, worker_id: usize, id: FiberId) {
    let Some(fiber) = sched.get(id) else {
        return;
    };

    if fiber.owner() == crate::fiber::NO_WORKER {
        // Fresh spawn: bind it here for the rest of its life.
        fiber.set_owner(worker_id);
        with_ctx(|c| c.ready.push_back(id));
        return;
    }

    if fiber.state() == FiberState::Blocked && fiber.consume_wake() {
        fiber.set_wake_cause(WakeCause::Wake);
        fiber.set_state(FiberState::Ready);
        with_ctx(|c| c.ready.push_back(id));
    }
    // Running or already-Ready: any token is consumed at the next park
    // or right after the switch back.
}

/// Step (3): resume one fiber and file it again according to how it
/// yielded.
fn run_fiber(sched: &'static Scheduler, id: FiberId) {
    let Some(fiber) = sched.get(id) else {
        return;
    };
    if fiber.state() != FiberState::Ready {
        return;
    }

    fiber.set_state(FiberState::Running);
    tls::set_current(std::sync::Arc::as_ptr(&fiber));

    // Safety: sched_ctx points at this worker's save area, the fiber
    // context is either fresh or was saved by its last yield on this
    // worker. The fiber Arc outlives the switch via `fiber`.
    unsafe {
        arch::context_switch(tls::sched_ctx(), fiber.ctx_ptr());
    }

    tls::clear_current();

    match fiber.state() {
        FiberState::Ready => {
            // Cooperative yield: straight back onto the queue. Requeued
            // here, after the context is saved, never in yield itself.
            with_ctx(|c| c.ready.push_back(id));
        }
        FiberState::Blocked => {
            // A wake may have raced the park; the token tells us.
            if fiber.consume_wake() {
                fiber.set_wake_cause(WakeCause::Wake);
                fiber.set_state(FiberState::Ready);
                with_ctx(|c| c.ready.push_back(id));
            }
        }
        FiberState::Terminal => {
            sched.remove(id);
        }
        FiberState::Running => {
            log_warn!("fiber {} returned to scheduler while RUNNING", id);
        }
    }
}
