//! Fiber state machine and yield bookkeeping types

use core::fmt;

/// State of a fiber.
///
/// Constructed `Ready`; `Ready` ↔ `Running` ↔ `Blocked` transitions are
/// driven by the scheduler; `Terminal` is reached exactly once and is
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FiberState {
    /// Runnable, queued on its worker.
    Ready = 0,

    /// Currently executing on a worker.
    Running = 1,

    /// Parked on a wake source (fd, deadline or wait queue).
    Blocked = 2,

    /// Finished. The fiber may be destroyed but never resumed.
    Terminal = 3,
}

impl FiberState {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, FiberState::Terminal)
    }
}

impl From<u8> for FiberState {
    fn from(v: u8) -> Self {
        match v {
            0 => FiberState::Ready,
            1 => FiberState::Running,
            2 => FiberState::Blocked,
            _ => FiberState::Terminal,
        }
    }
}

impl From<FiberState> for u8 {
    fn from(s: FiberState) -> u8 {
        s as u8
    }
}

impl fmt::Display for FiberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiberState::Ready => write!(f, "READY"),
            FiberState::Running => write!(f, "RUNNING"),
            FiberState::Blocked => write!(f, "BLOCKED"),
            FiberState::Terminal => write!(f, "TERMINAL"),
        }
    }
}

/// Why a fiber handed control back to its worker.
///
/// The worker inspects this right after the context switch returns and
/// files the fiber accordingly: ready queue, poll set, timer heap, or
/// nowhere (queue parks are resumed by an explicit wake).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum YieldReason {
    /// Voluntary yield; go straight back to the ready queue.
    Cooperative = 0,

    /// Parked on a file descriptor (optionally with a deadline).
    Fd = 1,

    /// Parked on a deadline only (sleep).
    Deadline = 2,

    /// Parked on a wait queue; a primitive holds the wake.
    Queue = 3,

    /// The fiber's entry returned; it is now terminal.
    Terminating = 4,
}

impl From<u8> for YieldReason {
    fn from(v: u8) -> Self {
        match v {
            0 => YieldReason::Cooperative,
            1 => YieldReason::Fd,
            2 => YieldReason::Deadline,
            3 => YieldReason::Queue,
            _ => YieldReason::Terminating,
        }
    }
}

impl From<YieldReason> for u8 {
    fn from(r: YieldReason) -> u8 {
        r as u8
    }
}

/// What actually woke a parked fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WakeCause {
    /// Directed wake (queue pop, cancellation, spurious).
    Wake = 0,

    /// The parked fd became readable.
    Readable = 1,

    /// The parked fd became writable.
    Writable = 2,

    /// The park deadline fired.
    Deadline = 3,
}

impl From<u8> for WakeCause {
    fn from(v: u8) -> Self {
        match v {
            1 => WakeCause::Readable,
            2 => WakeCause::Writable,
            3 => WakeCause::Deadline,
            _ => WakeCause::Wake,
        }
    }
}

impl From<WakeCause> for u8 {
    fn from(c: WakeCause) -> u8 {
        c as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for s in [
            FiberState::Ready,
            FiberState::Running,
            FiberState::Blocked,
            FiberState::Terminal,
        ] {
            assert_eq!(FiberState::from(u8::from(s)), s);
        }
        assert!(FiberState::Terminal.is_terminal());
        assert!(!FiberState::Blocked.is_terminal());
    }

    #[test]
    fn test_yield_reason_roundtrip() {
        for r in [
            YieldReason::Cooperative,
            YieldReason::Fd,
            YieldReason::Deadline,
            YieldReason::Queue,
            YieldReason::Terminating,
        ] {
            assert_eq!(YieldReason::from(u8::from(r)), r);
        }
    }
}
