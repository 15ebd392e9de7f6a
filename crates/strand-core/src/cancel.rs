//! Cooperative cancellation token
//!
//! Every fiber receives a token when spawned. Suspension points check
//! it and return `Err(SchedError::Cancelled)`; the fiber body decides
//! how far the error propagates.

use crate::error::{SchedError, SchedResult};
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Parked fibers are not interrupted by this
    /// alone; the scheduler pairs it with a wake.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Return `Err(Cancelled)` if cancellation was requested.
    ///
    /// ```ignore
    /// fn body(token: &CancelToken) -> SchedResult<()> {
    ///     loop {
    ///         token.check()?;
    ///         // ... work ...
    ///     }
    /// }
    /// ```
    #[inline]
    pub fn check(&self) -> SchedResult<()> {
        if self.is_cancelled() {
            Err(SchedError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_cancellation() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());

        token.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(SchedError::Cancelled));
    }

    #[test]
    fn test_clone_shares_state() {
        let a = CancelToken::new();
        let b = a.clone();
        a.cancel();
        assert!(b.is_cancelled());
    }
}
