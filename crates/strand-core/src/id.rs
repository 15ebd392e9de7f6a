//! Fiber identifier type

use core::fmt;

/// Identity of a fiber, assigned monotonically starting at 1 and never
/// recycled.
///
/// There is no reserved sentinel: "no fiber" is `Option<FiberId>`.
/// Equality is all the runtime needs from the type; wait queues and
/// poll registrations compare ids, and the registry keys on the raw
/// integer.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct FiberId(u64);

impl FiberId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        FiberId(raw)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FiberId({})", self.0)
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
