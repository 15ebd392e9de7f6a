//! Per-worker deadline heap
//!
//! Min-heap of park deadlines. Cancellation is lazy: an entry whose
//! park sequence number no longer matches its fiber's is skipped when
//! it pops, which avoids O(n) removal when an fd event wins the race
//! against its own timeout.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::os::unix::io::RawFd;
use std::time::Instant;
use strand_core::FiberId;

/// One armed deadline.
#[derive(Debug, Clone, Copy)]
pub struct TimerEntry {
    pub deadline: Instant,
    pub fiber: FiberId,
    /// Park sequence the entry belongs to; stale entries are skipped.
    pub seq: u64,
    /// Descriptor to unregister if the deadline fires first.
    pub fd: Option<RawFd>,
}

/// Wrapper inverting the ordering for a min-heap, tie-broken by fiber
/// id for determinism.
struct HeapEntry(TimerEntry);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.deadline == other.0.deadline && self.0.fiber == other.0.fiber
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        match other.0.deadline.cmp(&self.0.deadline) {
            CmpOrdering::Equal => other.0.fiber.as_u64().cmp(&self.0.fiber.as_u64()),
            ord => ord,
        }
    }
}

/// Worker-local deadline heap. No locking; only the owning worker
/// touches it.
#[derive(Default)]
pub struct DeadlineHeap {
    heap: BinaryHeap<HeapEntry>,
}

impl DeadlineHeap {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::with_capacity(64),
        }
    }

    pub fn insert(&mut self, entry: TimerEntry) {
        self.heap.push(HeapEntry(entry));
    }

    /// Earliest armed deadline, staleness ignored (an early wakeup is
    /// harmless; the pop filters).
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.0.deadline)
    }

    /// Pop the next expired entry, if any. Call in a loop.
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerEntry> {
        match self.heap.peek() {
            Some(e) if e.0.deadline <= now => Some(self.heap.pop().unwrap().0),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(fiber: u64, deadline: Instant) -> TimerEntry {
        TimerEntry {
            deadline,
            fiber: FiberId::new(fiber),
            seq: 1,
            fd: None,
        }
    }

    #[test]
    fn test_pop_in_deadline_order() {
        let now = Instant::now();
        let mut heap = DeadlineHeap::new();
        heap.insert(entry(3, now + Duration::from_millis(30)));
        heap.insert(entry(1, now + Duration::from_millis(10)));
        heap.insert(entry(2, now + Duration::from_millis(20)));

        let late = now + Duration::from_millis(50);
        assert_eq!(heap.pop_expired(late).unwrap().fiber, FiberId::new(1));
        assert_eq!(heap.pop_expired(late).unwrap().fiber, FiberId::new(2));
        assert_eq!(heap.pop_expired(late).unwrap().fiber, FiberId::new(3));
        assert!(heap.pop_expired(late).is_none());
    }

    #[test]
    fn test_unexpired_stays() {
        let now = Instant::now();
        let mut heap = DeadlineHeap::new();
        heap.insert(entry(1, now + Duration::from_secs(60)));

        assert!(heap.pop_expired(now).is_none());
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.next_deadline(), Some(now + Duration::from_secs(60)));
    }

    #[test]
    fn test_next_deadline_empty() {
        let heap = DeadlineHeap::new();
        assert!(heap.next_deadline().is_none());
        assert!(heap.is_empty());
    }
}
