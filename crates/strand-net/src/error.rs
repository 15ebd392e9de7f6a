//! Network error taxonomy
//!
//! Timeouts are recoverable status values: the caller may retry the
//! operation. Peer close terminates a connection cleanly; everything
//! else tears it down.

use core::fmt;
use strand_core::SchedError;

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// The per-operation deadline passed. Recoverable.
    Timeout,

    /// Orderly shutdown by the peer (zero-byte read).
    PeerClosed,

    /// A ring buffer could not make progress: the unread span already
    /// fills the ring.
    BufferFull,

    /// The fiber was cancelled during the operation.
    Cancelled,

    /// Scheduler-level failure (e.g. called off a fiber).
    Sched(SchedError),

    /// Any other socket error, by errno.
    Sys(i32),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Timeout => write!(f, "operation timed out"),
            NetError::PeerClosed => write!(f, "peer closed connection"),
            NetError::BufferFull => write!(f, "ring buffer exhausted"),
            NetError::Cancelled => write!(f, "fiber cancelled"),
            NetError::Sched(e) => write!(f, "scheduler error: {}", e),
            NetError::Sys(errno) => write!(f, "socket error: errno {}", errno),
        }
    }
}

impl std::error::Error for NetError {}

impl From<SchedError> for NetError {
    fn from(e: SchedError) -> Self {
        match e {
            SchedError::Cancelled => NetError::Cancelled,
            SchedError::Timeout => NetError::Timeout,
            other => NetError::Sched(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sched_conversion() {
        assert_eq!(NetError::from(SchedError::Cancelled), NetError::Cancelled);
        assert_eq!(NetError::from(SchedError::Timeout), NetError::Timeout);
        assert_eq!(
            NetError::from(SchedError::NotAFiber),
            NetError::Sched(SchedError::NotAFiber)
        );
    }
}
