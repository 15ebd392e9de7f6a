//! Global scheduler
//!
//! Owns the fiber registry and the worker pool, and exposes every
//! suspension point: `yield_now`, `park_fd`, `park_deadline`,
//! `park_queue`, plus `spawn`, `wake` and `cancel`. Fibers never touch
//! worker state directly; everything funnels through here.

use crate::arch;
use crate::config::RuntimeConfig;
use crate::fiber::{Fiber, NO_WORKER};
use crate::poller::Interest;
use crate::timer::TimerEntry;
use crate::tls;
use crate::worker::{self, WorkerShared};
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use strand_core::{
    CancelToken, FiberId, FiberState, SchedError, SchedResult, SpinLock, WakeCause, YieldReason,
};

static SCHEDULER: OnceLock<Scheduler> = OnceLock::new();

/// The process-wide scheduler.
pub struct Scheduler {
    config: RuntimeConfig,
    fibers: SpinLock<HashMap<u64, Arc<Fiber>>>,
    workers: Box<[WorkerShared]>,
    handles: SpinLock<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
    next_worker: AtomicUsize,
    running: AtomicBool,
}

/// Initialize the global scheduler. Errors if one already exists.
pub fn init(config: RuntimeConfig) -> SchedResult<&'static Scheduler> {
    config.validate()?;

    let mut workers = Vec::with_capacity(config.workers);
    for _ in 0..config.workers {
        workers.push(WorkerShared::new(config.remote_queue)?);
    }

    let sched = Scheduler {
        config,
        fibers: SpinLock::new(HashMap::new()),
        workers: workers.into_boxed_slice(),
        handles: SpinLock::new(Vec::new()),
        next_id: AtomicU64::new(1),
        next_worker: AtomicUsize::new(0),
        running: AtomicBool::new(false),
    };

    if SCHEDULER.set(sched).is_err() {
        return Err(SchedError::AlreadyRunning);
    }
    Ok(SCHEDULER.get().expect("just set"))
}

/// The global scheduler, if initialized.
pub fn global() -> Option<&'static Scheduler> {
    SCHEDULER.get()
}

impl Scheduler {
    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub(crate) fn worker(&self, i: usize) -> &WorkerShared {
        &self.workers[i]
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the worker threads.
    pub fn start(&'static self) -> SchedResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedError::AlreadyRunning);
        }
        strand_core::log::init();

        let mut handles = self.handles.lock();
        for i in 0..self.config.workers {
            let handle = std::thread::Builder::new()
                .name(format!("strand-worker-{}", i))
                .spawn(move || worker::worker_main(self, i))
                .map_err(|_| SchedError::Os(libc::EAGAIN))?;
            handles.push(handle);
        }
        Ok(())
    }

    /// Stop the worker threads. Ready fibers drain first; parked fibers
    /// are dropped without resuming.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for w in self.workers.iter() {
            w.waker.signal();
        }
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for h in handles {
            let _ = h.join();
        }
    }

    /// Create a READY fiber and hand it to a worker (round-robin).
    pub fn spawn<F>(&'static self, f: F) -> SchedResult<FiberId>
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        if !self.is_running() {
            return Err(SchedError::NotRunning);
        }
        if self.fibers.lock().len() >= self.config.max_fibers {
            return Err(SchedError::TooManyFibers);
        }

        let id = FiberId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let fiber = Fiber::new(id, self.config.stack_size, f)?;
        self.fibers.lock().insert(id.as_u64(), fiber);

        let target = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.post(target, id);
        Ok(id)
    }

    /// Push a fiber id onto a worker's remote queue and kick its waker.
    pub(crate) fn post(&self, worker: usize, id: FiberId) {
        let shared = &self.workers[worker];
        let mut raw = id.as_u64();
        loop {
            match shared.remote.push(raw) {
                Ok(()) => break,
                Err(returned) => {
                    // Queue full; the worker is draining it right now.
                    raw = returned;
                    std::thread::yield_now();
                }
            }
        }
        shared.waker.signal();
    }

    /// Directed wake: post a token and notify the owning worker. Safe
    /// against the enqueue-then-park window; a token posted before the
    /// park is consumed by the park prologue.
    pub fn wake(&self, id: FiberId) {
        let Some(fiber) = self.get(id) else {
            return;
        };
        fiber.set_wake_pending();
        let owner = fiber.owner();
        if owner != NO_WORKER {
            self.post(owner, id);
        }
        // Not yet admitted: the fiber still sits in a remote queue and
        // will consume the token at its first park.
    }

    /// Flag a fiber for cancellation and wake it so the next suspension
    /// point observes the flag.
    pub fn cancel(&self, id: FiberId) {
        if let Some(fiber) = self.get(id) {
            fiber.token().cancel();
        }
        self.wake(id);
    }

    pub(crate) fn get(&self, id: FiberId) -> Option<Arc<Fiber>> {
        self.fibers.lock().get(&id.as_u64()).cloned()
    }

    pub(crate) fn remove(&self, id: FiberId) {
        self.fibers.lock().remove(&id.as_u64());
    }

    /// Number of live (not yet destroyed) fibers.
    pub fn live_fibers(&self) -> usize {
        self.fibers.lock().len()
    }

    /// State of a fiber, `None` once destroyed.
    pub fn fiber_state(&self, id: FiberId) -> Option<FiberState> {
        self.get(id).map(|f| f.state())
    }
}

/// Spawn onto the global scheduler.
pub fn spawn<F>(f: F) -> SchedResult<FiberId>
where
    F: FnOnce(&CancelToken) + Send + 'static,
{
    global().ok_or(SchedError::NotRunning)?.spawn(f)
}

/// Cancel a fiber on the global scheduler.
pub fn cancel_fiber(id: FiberId) {
    if let Some(sched) = global() {
        sched.cancel(id);
    }
}

/// Save the running fiber's context and return to the worker loop.
fn switch_to_scheduler() {
    let fiber_ctx = tls::with_current(|f| f.ctx_ptr()).expect("switch outside fiber");
    // Safety: both contexts are live; the worker loop owns the other
    // side and resumes us through the same mechanism.
    unsafe {
        arch::context_switch(fiber_ctx, tls::sched_ctx());
    }
}

/// Voluntary yield. Off a fiber this degrades to an OS-thread yield.
pub fn yield_now() {
    if !tls::in_fiber() {
        std::thread::yield_now();
        return;
    }
    tls::with_current(|f| {
        f.set_yield_reason(YieldReason::Cooperative);
        f.set_state(FiberState::Ready);
    });
    // The worker requeues us after the context is saved; doing it here
    // would let the wake race the save.
    switch_to_scheduler();
}

/// Park the current fiber on `fd` until `interest` is satisfied or the
/// deadline passes. Returns which condition fired.
pub fn park_fd(fd: RawFd, interest: Interest, deadline: Option<Instant>) -> SchedResult<WakeCause> {
    if !tls::in_fiber() {
        return Err(SchedError::NotAFiber);
    }
    let (id, seq) = tls::with_current(|f| {
        f.token().check()?;
        // A leftover token from an old wake must not abort this park.
        f.consume_wake();
        let seq = f.bump_park_seq();
        f.set_wake_cause(WakeCause::Wake);
        Ok::<_, SchedError>((f.id(), seq))
    })
    .ok_or(SchedError::NotAFiber)??;

    worker::with_ctx(|c| -> SchedResult<()> {
        c.poller.register(fd, interest, id, seq)?;
        if let Some(d) = deadline {
            c.timers.insert(TimerEntry {
                deadline: d,
                fiber: id,
                seq,
                fd: Some(fd),
            });
        }
        Ok(())
    })?;

    tls::with_current(|f| {
        f.set_yield_reason(YieldReason::Fd);
        f.set_state(FiberState::Blocked);
    });
    switch_to_scheduler();

    let cause = tls::with_current(|f| f.wake_cause()).expect("resumed outside fiber");
    if cause == WakeCause::Wake {
        // Directed wake (cancellation or a raced queue wake): our fd
        // registration is still armed. Drop it.
        worker::with_ctx(|c| {
            c.poller.remove(fd, id);
        });
    }
    tls::with_current(|f| f.token().check()).ok_or(SchedError::NotAFiber)??;
    Ok(cause)
}

/// Park the current fiber until `deadline` (or a directed wake).
pub fn park_deadline(deadline: Instant) -> SchedResult<WakeCause> {
    if !tls::in_fiber() {
        return Err(SchedError::NotAFiber);
    }
    let (id, seq) = tls::with_current(|f| {
        f.token().check()?;
        f.consume_wake();
        let seq = f.bump_park_seq();
        f.set_wake_cause(WakeCause::Wake);
        Ok::<_, SchedError>((f.id(), seq))
    })
    .ok_or(SchedError::NotAFiber)??;

    worker::with_ctx(|c| {
        c.timers.insert(TimerEntry {
            deadline,
            fiber: id,
            seq,
            fd: None,
        });
    });

    tls::with_current(|f| {
        f.set_yield_reason(YieldReason::Deadline);
        f.set_state(FiberState::Blocked);
    });
    switch_to_scheduler();

    let cause = tls::with_current(|f| f.wake_cause()).expect("resumed outside fiber");
    tls::with_current(|f| f.token().check()).ok_or(SchedError::NotAFiber)??;
    Ok(cause)
}

/// Park the current fiber on a wait queue owned by a synchronization
/// primitive. Resumed by `Scheduler::wake`. Returns immediately if the
/// wake raced ahead of the park.
pub fn park_queue() -> SchedResult<()> {
    if !tls::in_fiber() {
        return Err(SchedError::NotAFiber);
    }
    let raced = tls::with_current(|f| {
        f.token().check()?;
        f.bump_park_seq();
        f.set_wake_cause(WakeCause::Wake);
        Ok::<_, SchedError>(f.consume_wake())
    })
    .ok_or(SchedError::NotAFiber)??;
    if raced {
        return Ok(());
    }

    tls::with_current(|f| {
        f.set_yield_reason(YieldReason::Queue);
        f.set_state(FiberState::Blocked);
    });
    switch_to_scheduler();

    tls::with_current(|f| f.token().check()).ok_or(SchedError::NotAFiber)??;
    Ok(())
}

/// Suspend the current fiber for at least `dur`. Off a fiber this
/// degrades to a thread sleep.
pub fn sleep(dur: Duration) -> SchedResult<()> {
    if !tls::in_fiber() {
        std::thread::sleep(dur);
        return Ok(());
    }
    let deadline = Instant::now() + dur;
    loop {
        if Instant::now() >= deadline {
            return Ok(());
        }
        // A spurious directed wake just re-parks.
        park_deadline(deadline)?;
    }
}

/// Mark the current fiber TERMINAL and leave its stack forever.
pub(crate) fn finish_current() -> ! {
    tls::with_current(|f| {
        f.set_yield_reason(YieldReason::Terminating);
        f.set_state(FiberState::Terminal);
    });
    switch_to_scheduler();
    unreachable!("terminal fiber was resumed");
}

/// Identity of the current fiber and its worker, if on one.
pub fn current_ids() -> Option<(FiberId, usize)> {
    tls::with_current(|f| (f.id(), f.owner()))
}

/// Id of the current fiber, if this call runs on one.
pub fn current_id() -> Option<FiberId> {
    tls::current_fiber_id()
}

/// Whether this call runs on a fiber stack.
pub fn in_fiber() -> bool {
    tls::in_fiber()
}
