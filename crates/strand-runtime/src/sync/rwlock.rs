//! Fiber reader-writer lock
//!
//! Composed of a write mutex W, a read mutex R and a reader count:
//! the first reader acquires W, the last releases it, so a writer and
//! any reader exclude each other while readers share freely. R is held
//! only for the count bookkeeping and is taken by try-spin; the
//! `reader_blocked` latch tells later readers a writer is active so
//! they escalate from spinning to parking.

use super::mutex::FiberMutex;
use crate::scheduler;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use strand_core::SchedResult;

pub struct FiberRwLock {
    write_lock: FiberMutex,
    read_lock: FiberMutex,
    readers: AtomicUsize,
    reader_blocked: AtomicBool,
}

impl FiberRwLock {
    pub fn new() -> Self {
        Self {
            write_lock: FiberMutex::new(),
            read_lock: FiberMutex::new(),
            readers: AtomicUsize::new(0),
            reader_blocked: AtomicBool::new(false),
        }
    }

    /// Exclusive lock: delegates to W.
    pub fn lock(&self) -> SchedResult<FiberRwLockWriteGuard<'_>> {
        self.write_lock.raw_lock()?;
        Ok(FiberRwLockWriteGuard { rw: self })
    }

    /// Shared lock.
    pub fn lock_shared(&self) -> SchedResult<FiberRwLockReadGuard<'_>> {
        self.spin_read_lock()?;

        if self.readers.fetch_add(1, Ordering::SeqCst) == 0 {
            // First reader holds W for the whole read phase.
            if !self.write_lock.raw_try_lock() {
                self.reader_blocked.store(true, Ordering::SeqCst);
                let res = self.write_lock.raw_lock();
                self.reader_blocked.store(false, Ordering::SeqCst);
                if let Err(e) = res {
                    self.readers.fetch_sub(1, Ordering::SeqCst);
                    self.read_lock.raw_unlock();
                    return Err(e);
                }
            }
        }

        self.read_lock.raw_unlock();
        Ok(FiberRwLockReadGuard { rw: self })
    }

    /// Take R by try-spin, escalating to a park when a writer is
    /// active. Yields between attempts so a same-worker holder can run.
    fn spin_read_lock(&self) -> SchedResult<()> {
        loop {
            if self.read_lock.raw_try_lock() {
                return Ok(());
            }
            if self.reader_blocked.load(Ordering::SeqCst) {
                return self.read_lock.raw_lock();
            }
            scheduler::yield_now();
        }
    }

    fn unlock_shared(&self) {
        loop {
            if self.read_lock.raw_try_lock() {
                break;
            }
            scheduler::yield_now();
        }
        if self.readers.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Last reader out releases W.
            self.write_lock.raw_unlock();
        }
        self.read_lock.raw_unlock();
    }
}

impl Default for FiberRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FiberRwLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberRwLock")
            .field("readers", &self.readers.load(Ordering::Relaxed))
            .finish()
    }
}

#[must_use = "the lock releases as soon as the guard drops"]
pub struct FiberRwLockWriteGuard<'a> {
    rw: &'a FiberRwLock,
}

impl Drop for FiberRwLockWriteGuard<'_> {
    fn drop(&mut self) {
        self.rw.write_lock.raw_unlock();
    }
}

#[must_use = "the lock releases as soon as the guard drops"]
pub struct FiberRwLockReadGuard<'a> {
    rw: &'a FiberRwLock,
}

impl Drop for FiberRwLockReadGuard<'_> {
    fn drop(&mut self) {
        self.rw.unlock_shared();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncontended_write() {
        let rw = FiberRwLock::new();
        let g = rw.lock().unwrap();
        drop(g);
        let g = rw.lock().unwrap();
        drop(g);
    }

    #[test]
    fn test_readers_share() {
        let rw = FiberRwLock::new();
        let a = rw.lock_shared().unwrap();
        let b = rw.lock_shared().unwrap();
        assert_eq!(rw.readers.load(Ordering::SeqCst), 2);
        drop(a);
        drop(b);
        assert_eq!(rw.readers.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reader_holds_w() {
        let rw = FiberRwLock::new();
        let r = rw.lock_shared().unwrap();
        // W is held while any reader is in, so a writer cannot enter.
        assert!(rw.write_lock.try_lock().is_none());
        drop(r);
        assert!(rw.write_lock.try_lock().is_some());
    }
}
