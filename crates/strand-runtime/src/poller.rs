//! Per-worker readiness source (epoll)
//!
//! Each worker owns one epoll instance. Parked fibers register a
//! (fd, interest) pair; the worker loop waits on the instance, pops the
//! oldest matching waiter per event and makes it ready. Several fibers
//! of one worker may wait on the same descriptor (the mutex eventfd
//! case); waiters on one fd wake in registration order.

use crate::stack::errno;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use strand_core::{FiberId, SchedError, SchedResult};

/// What a parked fiber is waiting for on its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

/// One parked waiter.
#[derive(Debug, Clone, Copy)]
pub struct FdWait {
    pub fiber: FiberId,
    pub seq: u64,
    pub interest: Interest,
}

pub struct Poller {
    epfd: RawFd,
    /// Waiters per descriptor, oldest first.
    registered: HashMap<RawFd, Vec<FdWait>>,
    events: Vec<libc::epoll_event>,
}

impl Poller {
    pub fn new(batch: usize) -> SchedResult<Self> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(SchedError::Os(errno()));
        }
        Ok(Self {
            epfd,
            registered: HashMap::new(),
            events: vec![libc::epoll_event { events: 0, u64: 0 }; batch.max(1)],
        })
    }

    /// Permanently watch `fd` for readability, reporting `token` as the
    /// event payload. Used for the worker's own waker eventfd.
    pub fn add_persistent(&self, fd: RawFd, token: u64) -> SchedResult<()> {
        let mut ev = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: token,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_ADD, fd, &mut ev) };
        if ret != 0 {
            return Err(SchedError::Os(errno()));
        }
        Ok(())
    }

    fn mask_for(waiters: &[FdWait]) -> u32 {
        let mut mask = libc::EPOLLRDHUP as u32;
        for w in waiters {
            mask |= match w.interest {
                Interest::Readable => libc::EPOLLIN as u32,
                Interest::Writable => libc::EPOLLOUT as u32,
            };
        }
        mask
    }

    fn ctl(&self, op: i32, fd: RawFd, mask: u32) -> SchedResult<()> {
        let mut ev = libc::epoll_event {
            events: mask,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut ev) };
        if ret != 0 {
            return Err(SchedError::Os(errno()));
        }
        Ok(())
    }

    /// Park `fiber` on `fd`.
    pub fn register(
        &mut self,
        fd: RawFd,
        interest: Interest,
        fiber: FiberId,
        seq: u64,
    ) -> SchedResult<()> {
        let waiters = self.registered.entry(fd).or_default();
        let fresh = waiters.is_empty();
        waiters.push(FdWait {
            fiber,
            seq,
            interest,
        });
        let mask = Self::mask_for(waiters);
        let op = if fresh {
            libc::EPOLL_CTL_ADD
        } else {
            libc::EPOLL_CTL_MOD
        };
        let res = self.ctl(op, fd, mask);
        if res.is_err() {
            if let Some(w) = self.registered.get_mut(&fd) {
                w.pop();
                if w.is_empty() {
                    self.registered.remove(&fd);
                }
            }
        }
        res
    }

    /// An event fired on `fd`: pop the oldest waiter it satisfies.
    pub fn complete(&mut self, fd: RawFd, event_bits: u32) -> Option<FdWait> {
        let waiters = self.registered.get_mut(&fd)?;
        let err = event_bits
            & (libc::EPOLLERR as u32 | libc::EPOLLHUP as u32 | libc::EPOLLRDHUP as u32)
            != 0;
        let idx = waiters.iter().position(|w| {
            err || match w.interest {
                Interest::Readable => event_bits & libc::EPOLLIN as u32 != 0,
                Interest::Writable => event_bits & libc::EPOLLOUT as u32 != 0,
            }
        })?;
        let wait = waiters.remove(idx);
        self.sync_fd(fd);
        Some(wait)
    }

    /// Drop one fiber's registration on `fd` (deadline fired, wake by
    /// token, cancellation). Returns whether an entry existed.
    pub fn remove(&mut self, fd: RawFd, fiber: FiberId) -> bool {
        let Some(waiters) = self.registered.get_mut(&fd) else {
            return false;
        };
        let Some(idx) = waiters.iter().position(|w| w.fiber == fiber) else {
            return false;
        };
        waiters.remove(idx);
        self.sync_fd(fd);
        true
    }

    /// Re-arm or drop the epoll registration after a waiter list change.
    fn sync_fd(&mut self, fd: RawFd) {
        let mask = match self.registered.get(&fd) {
            Some(w) if w.is_empty() => None,
            Some(w) => Some(Self::mask_for(w)),
            None => return,
        };
        match mask {
            Some(mask) => {
                let _ = self.ctl(libc::EPOLL_CTL_MOD, fd, mask);
            }
            None => {
                self.registered.remove(&fd);
                let ret = unsafe {
                    libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut())
                };
                // ENOENT/EBADF happen when the socket already closed;
                // both also dropped the fd from the interest list.
                if ret != 0 && errno() != libc::ENOENT && errno() != libc::EBADF {
                    strand_core::log_warn!("epoll del fd {} failed: errno {}", fd, errno());
                }
            }
        }
    }

    /// Wait for events. Returns the number of events stored.
    pub fn wait(&mut self, timeout_ms: i32) -> usize {
        let ret = unsafe {
            libc::epoll_wait(
                self.epfd,
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                timeout_ms,
            )
        };
        if ret < 0 {
            if errno() != libc::EINTR {
                strand_core::log_error!("epoll_wait failed: errno {}", errno());
            }
            return 0;
        }
        ret as usize
    }

    /// Copy out event `i` as (payload, event bits).
    #[inline]
    pub fn event(&self, i: usize) -> (u64, u32) {
        let ev = self.events[i];
        (ev.u64, ev.events)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe { libc::close(self.epfd) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waker::WakerFd;

    #[test]
    fn test_persistent_waker_event() {
        let mut poller = Poller::new(8).unwrap();
        let waker = WakerFd::create().unwrap();
        poller.add_persistent(waker.fd(), u64::MAX).unwrap();

        assert_eq!(poller.wait(0), 0);

        waker.signal();
        let n = poller.wait(100);
        assert_eq!(n, 1);
        let (token, bits) = poller.event(0);
        assert_eq!(token, u64::MAX);
        assert_ne!(bits & libc::EPOLLIN as u32, 0);
    }

    #[test]
    fn test_waiters_wake_fifo() {
        let mut poller = Poller::new(8).unwrap();
        let efd = WakerFd::create_semaphore().unwrap();

        poller
            .register(efd.fd(), Interest::Readable, FiberId::new(1), 1)
            .unwrap();
        poller
            .register(efd.fd(), Interest::Readable, FiberId::new(2), 1)
            .unwrap();

        efd.signal();
        let n = poller.wait(100);
        assert_eq!(n, 1);
        let (data, bits) = poller.event(0);
        assert_eq!(data, efd.fd() as u64);

        let first = poller.complete(data as RawFd, bits).unwrap();
        assert_eq!(first.fiber, FiberId::new(1));

        // Second waiter still registered; the fd is still readable.
        assert!(efd.try_consume());
        efd.signal();
        let n = poller.wait(100);
        assert_eq!(n, 1);
        let (data, bits) = poller.event(0);
        let second = poller.complete(data as RawFd, bits).unwrap();
        assert_eq!(second.fiber, FiberId::new(2));
    }

    #[test]
    fn test_remove_clears_registration() {
        let mut poller = Poller::new(8).unwrap();
        let efd = WakerFd::create().unwrap();

        poller
            .register(efd.fd(), Interest::Readable, FiberId::new(9), 1)
            .unwrap();
        assert!(poller.remove(efd.fd(), FiberId::new(9)));
        assert!(!poller.remove(efd.fd(), FiberId::new(9)));

        efd.signal();
        assert_eq!(poller.wait(0), 0);
    }
}
