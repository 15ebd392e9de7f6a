//! Fiber condition variable
//!
//! FIFO wait queue with the same spinlock discipline as `FiberMutex`
//! plus a latched notify-all flag. `wait` enqueues the fiber, releases
//! the mutex, parks on-queue, and re-acquires the mutex on wake; the
//! spinlock makes the enqueue and the release observable together to
//! any notifier that holds the mutex.

use super::mutex::{FiberMutex, FiberMutexGuard};
use crate::scheduler;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use strand_core::{FiberId, FiberState, SchedError, SchedResult, SpinLock};

pub struct FiberCondvar {
    waiters: SpinLock<VecDeque<(FiberId, usize)>>,
    notify_all: AtomicBool,
}

impl FiberCondvar {
    pub fn new() -> Self {
        Self {
            waiters: SpinLock::new(VecDeque::new()),
            notify_all: AtomicBool::new(false),
        }
    }

    /// Release the mutex, park until notified, re-acquire the mutex.
    ///
    /// Wakeups may be spurious; callers loop on their predicate. On
    /// cancellation the error surfaces after the guard is dropped, so
    /// the mutex is not held.
    pub fn wait<'a>(&self, guard: FiberMutexGuard<'a>) -> SchedResult<FiberMutexGuard<'a>> {
        let mutex = guard.mutex();
        let (id, worker) = scheduler::current_ids().ok_or(SchedError::NotAFiber)?;

        {
            let mut q = self.waiters.lock();
            q.push_back((id, worker));
        }
        // Unlock only after we are queued; a notifier holding the mutex
        // therefore always sees us.
        drop(guard);

        let parked = scheduler::park_queue();
        self.notify_all.swap(false, Ordering::SeqCst);

        if parked.is_err() {
            // Cancelled before a notify popped us; drop the stale entry.
            let mut q = self.waiters.lock();
            if let Some(pos) = q.iter().position(|&(f, _)| f == id) {
                q.remove(pos);
            }
        }

        match (parked, mutex.lock()) {
            (Ok(()), Ok(g)) => Ok(g),
            (Err(e), Ok(g)) => {
                drop(g);
                Err(e)
            }
            (_, Err(e)) => Err(e),
        }
    }

    /// Resume the oldest waiter, if any.
    pub fn notify_one(&self) {
        let popped = self.waiters.lock().pop_front();
        if let Some((id, _worker)) = popped {
            if let Some(sched) = scheduler::global() {
                sched.wake(id);
            }
        }
    }

    /// Latch the flag and resume every waiter; each re-contends for the
    /// mutex on its own.
    pub fn notify_all(&self) {
        self.notify_all.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.waiters.lock().drain(..).collect();
        if let Some(sched) = scheduler::global() {
            for (id, _worker) in drained {
                sched.wake(id);
            }
        }
    }
}

impl Default for FiberCondvar {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FiberCondvar {
    fn drop(&mut self) {
        let q = self.waiters.lock();
        for (id, worker) in q.iter() {
            let live = scheduler::global()
                .and_then(|s| s.fiber_state(*id))
                .is_some_and(|st| st != FiberState::Terminal);
            if live {
                panic!(
                    "FiberCondvar dropped with live waiter: fiber {} on worker {}",
                    id, worker
                );
            }
        }
    }
}

impl std::fmt::Debug for FiberCondvar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberCondvar")
            .field("waiters", &self.waiters.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_without_waiters_is_noop() {
        let cv = FiberCondvar::new();
        cv.notify_one();
        cv.notify_all();
        assert_eq!(cv.waiters.lock().len(), 0);
    }

    #[test]
    fn test_wait_off_fiber_is_rejected() {
        let cv = FiberCondvar::new();
        let m = FiberMutex::new();
        let g = m.lock().unwrap();
        assert!(matches!(cv.wait(g), Err(SchedError::NotAFiber)));
    }
}
