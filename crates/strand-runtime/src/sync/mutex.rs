//! Fiber mutex
//!
//! An atomic lock flag plus a FIFO wait queue of (fiber, worker) pairs
//! under a spinlock, plus one owned semaphore eventfd. `unlock` pops
//! one waiter and writes one token; woken waiters consume the token
//! with a non-blocking read and retry the flag, re-parking on EAGAIN.
//! Fairness is FIFO-among-contenders: a fresh caller that finds the
//! flag clear may take the lock ahead of the queue, but the queue
//! always drains because tokens and pops stay in balance.

use crate::poller::Interest;
use crate::scheduler;
use crate::waker::WakerFd;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use strand_core::{FiberId, FiberState, SchedError, SchedResult, SpinLock};

pub struct FiberMutex {
    locked: AtomicBool,
    /// Wake-token carrier; one write per popped waiter.
    efd: WakerFd,
    /// FIFO of parked (fiber, worker) pairs.
    waiters: SpinLock<VecDeque<(FiberId, usize)>>,
}

impl FiberMutex {
    pub fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            // A mutex without a wake source is unusable; eventfd
            // exhaustion here is fatal by design of the primitive.
            efd: WakerFd::create_semaphore().expect("eventfd for FiberMutex"),
            waiters: SpinLock::new(VecDeque::new()),
        }
    }

    #[inline]
    pub(crate) fn raw_try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquire without parking. Never suspends.
    pub fn try_lock(&self) -> Option<FiberMutexGuard<'_>> {
        if self.raw_try_lock() {
            Some(FiberMutexGuard { lock: self })
        } else {
            None
        }
    }

    /// Acquire, parking the fiber while contended.
    pub fn lock(&self) -> SchedResult<FiberMutexGuard<'_>> {
        self.raw_lock()?;
        Ok(FiberMutexGuard { lock: self })
    }

    pub(crate) fn raw_lock(&self) -> SchedResult<()> {
        loop {
            if self.raw_try_lock() {
                return Ok(());
            }

            let (id, worker) = scheduler::current_ids().ok_or(SchedError::NotAFiber)?;
            {
                let mut q = self.waiters.lock();
                // Re-check under the queue lock. unlock clears the flag
                // before inspecting the queue, so a release between our
                // failed try and this point cannot be missed.
                if self.raw_try_lock() {
                    return Ok(());
                }
                q.push_back((id, worker));
            }

            if let Err(e) = self.wait_token() {
                // Cancelled mid-wait. Drop our queue entry; if an
                // unlock already popped it, the matching token is on
                // the eventfd and the next waiter's first read takes it.
                let mut q = self.waiters.lock();
                if let Some(pos) = q.iter().position(|&(f, _)| f == id) {
                    q.remove(pos);
                }
                return Err(e);
            }
        }
    }

    /// Block until one wake token is consumed.
    fn wait_token(&self) -> SchedResult<()> {
        loop {
            if self.efd.try_consume() {
                return Ok(());
            }
            scheduler::park_fd(self.efd.fd(), Interest::Readable, None)?;
        }
    }

    pub(crate) fn raw_unlock(&self) {
        self.locked.store(false, Ordering::Release);
        let mut q = self.waiters.lock();
        if q.pop_front().is_some() {
            // One pop, one token. The popped waiter's worker sees the
            // eventfd readable and resumes it there.
            self.efd.signal();
        }
    }
}

impl Default for FiberMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FiberMutex {
    fn drop(&mut self) {
        let q = self.waiters.lock();
        for (id, worker) in q.iter() {
            let live = scheduler::global()
                .and_then(|s| s.fiber_state(*id))
                .is_some_and(|st| st != FiberState::Terminal);
            if live {
                panic!(
                    "FiberMutex dropped with live waiter: fiber {} on worker {}",
                    id, worker
                );
            }
        }
    }
}

impl std::fmt::Debug for FiberMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberMutex")
            .field("locked", &self.locked.load(Ordering::Relaxed))
            .field("waiters", &self.waiters.lock().len())
            .finish()
    }
}

/// Releases the mutex on drop.
#[must_use = "the mutex unlocks as soon as the guard drops"]
pub struct FiberMutexGuard<'a> {
    lock: &'a FiberMutex,
}

impl<'a> FiberMutexGuard<'a> {
    pub(crate) fn mutex(&self) -> &'a FiberMutex {
        self.lock
    }
}

impl Drop for FiberMutexGuard<'_> {
    fn drop(&mut self) {
        self.lock.raw_unlock();
    }
}

// Queue discipline sanity checks that need no runtime.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_lock_excludes() {
        let m = FiberMutex::new();
        let g = m.try_lock();
        assert!(g.is_some());
        assert!(m.try_lock().is_none());
        drop(g);
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn test_unlock_without_waiters_writes_no_token() {
        let m = FiberMutex::new();
        let g = m.try_lock().unwrap();
        drop(g);
        assert!(!m.efd.try_consume());
    }

    #[test]
    fn test_lock_off_fiber_is_rejected_when_contended() {
        let m = FiberMutex::new();
        let _g = m.try_lock().unwrap();
        // Contended path needs a fiber identity to queue.
        assert_eq!(m.raw_lock(), Err(SchedError::NotAFiber));
    }

    #[test]
    fn test_uncontended_lock_off_fiber() {
        // An uncontended acquire never parks, so it works anywhere.
        let m = FiberMutex::new();
        let g = m.lock().unwrap();
        drop(g);
    }
}
