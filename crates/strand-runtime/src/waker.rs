//! Eventfd wake sources
//!
//! Two flavors share the wrapper: coalescing (worker wakers — many
//! signals, one wakeup) and semaphore (mutex wake tokens — each write
//! is consumed by exactly one read).

use crate::stack::errno;
use std::os::unix::io::RawFd;
use strand_core::{SchedError, SchedResult};

pub struct WakerFd {
    fd: RawFd,
}

impl WakerFd {
    /// Coalescing eventfd: N signals before a drain produce one wakeup.
    pub fn create() -> SchedResult<Self> {
        Self::create_flags(libc::EFD_NONBLOCK | libc::EFD_CLOEXEC)
    }

    /// Semaphore eventfd: each successful read consumes exactly one
    /// signal. Used as the wake-token carrier of `FiberMutex`.
    pub fn create_semaphore() -> SchedResult<Self> {
        Self::create_flags(libc::EFD_NONBLOCK | libc::EFD_CLOEXEC | libc::EFD_SEMAPHORE)
    }

    fn create_flags(flags: i32) -> SchedResult<Self> {
        let fd = unsafe { libc::eventfd(0, flags) };
        if fd < 0 {
            return Err(SchedError::Os(errno()));
        }
        Ok(Self { fd })
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Add one signal. EAGAIN means the counter is saturated, which
    /// already implies a pending wakeup.
    pub fn signal(&self) {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd,
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 && errno() != libc::EAGAIN {
            strand_core::log_error!("eventfd write failed: errno {}", errno());
        }
    }

    /// Consume one signal (semaphore) or all of them (coalescing).
    /// Returns false when none were pending.
    pub fn try_consume(&self) -> bool {
        let mut val: u64 = 0;
        let ret = unsafe {
            libc::read(
                self.fd,
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        ret == 8
    }

    /// Drain every pending signal.
    pub fn drain(&self) {
        while self.try_consume() {}
    }
}

impl Drop for WakerFd {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalescing_drain() {
        let w = WakerFd::create().unwrap();
        assert!(!w.try_consume());

        w.signal();
        w.signal();
        w.signal();
        // Coalescing mode: one read drains the whole counter.
        assert!(w.try_consume());
        assert!(!w.try_consume());
    }

    #[test]
    fn test_semaphore_tokens() {
        let w = WakerFd::create_semaphore().unwrap();
        w.signal();
        w.signal();
        // Semaphore mode: one read per signal.
        assert!(w.try_consume());
        assert!(w.try_consume());
        assert!(!w.try_consume());
    }
}
