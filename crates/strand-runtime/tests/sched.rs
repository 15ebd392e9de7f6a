//! Scheduler and fiber-sync behavior on a single worker.
//!
//! One worker makes interleavings deterministic: a fiber runs until it
//! yields or parks, and ready fibers resume in FIFO order.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use strand_core::{SchedError, SpinLock};
use strand_runtime::{scheduler, FiberCondvar, FiberMutex, FiberRwLock, RuntimeConfig, Scheduler};

fn rt() -> &'static Scheduler {
    static RT: OnceLock<&'static Scheduler> = OnceLock::new();
    RT.get_or_init(|| {
        let sched = scheduler::init(RuntimeConfig::new().workers(1)).unwrap();
        sched.start().unwrap();
        sched
    })
}

fn wait_until(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Plain non-atomic counter. Safe only under external mutual exclusion;
/// that is exactly what the mutex tests prove.
struct RacyCell(UnsafeCell<u64>);
unsafe impl Sync for RacyCell {}
impl RacyCell {
    fn new() -> Self {
        Self(UnsafeCell::new(0))
    }
    unsafe fn get(&self) -> u64 {
        *self.0.get()
    }
    unsafe fn set(&self, v: u64) {
        *self.0.get() = v;
    }
}

#[test]
fn test_spawn_runs_to_completion() {
    rt();
    let done = Arc::new(AtomicBool::new(false));
    let d = done.clone();
    scheduler::spawn(move |_| {
        d.store(true, Ordering::SeqCst);
    })
    .unwrap();
    assert!(wait_until(|| done.load(Ordering::SeqCst), Duration::from_secs(5)));
}

#[test]
fn test_cooperative_yield_alternates() {
    rt();
    let log = Arc::new(SpinLock::new(String::new()));
    let done = Arc::new(AtomicUsize::new(0));

    // Spawn both children from one parent fiber so they are admitted
    // back-to-back and alternate deterministically on one worker.
    let (log2, done2) = (log.clone(), done.clone());
    scheduler::spawn(move |_| {
        for ch in ['a', 'b'] {
            let log = log2.clone();
            let done = done2.clone();
            scheduler::spawn(move |_| {
                for _ in 0..3 {
                    log.lock().push(ch);
                    scheduler::yield_now();
                }
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
    })
    .unwrap();

    assert!(wait_until(
        || done.load(Ordering::SeqCst) == 2,
        Duration::from_secs(5)
    ));
    assert_eq!(log.lock().as_str(), "ababab");
}

#[test]
fn test_sleep_waits_roughly_long_enough() {
    rt();
    let done = Arc::new(AtomicBool::new(false));
    let d = done.clone();
    let start = Instant::now();
    scheduler::spawn(move |_| {
        scheduler::sleep(Duration::from_millis(30)).unwrap();
        d.store(true, Ordering::SeqCst);
    })
    .unwrap();
    assert!(wait_until(|| done.load(Ordering::SeqCst), Duration::from_secs(5)));
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_mutex_excludes_two_incrementers() {
    rt();
    // Two fibers on one worker, 10k increments each under one mutex,
    // must leave the counter at exactly 20k.
    let mutex = Arc::new(FiberMutex::new());
    let counter = Arc::new(RacyCell::new());
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let mutex = mutex.clone();
        let counter = counter.clone();
        let done = done.clone();
        scheduler::spawn(move |_| {
            for _ in 0..10_000 {
                let guard = mutex.lock().unwrap();
                // Read-yield-write would lose updates without the lock.
                let v = unsafe { counter.get() };
                scheduler::yield_now();
                unsafe { counter.set(v + 1) };
                drop(guard);
            }
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    assert!(wait_until(
        || done.load(Ordering::SeqCst) == 2,
        Duration::from_secs(60)
    ));
    assert_eq!(unsafe { counter.get() }, 20_000);
}

#[test]
fn test_mutex_waiters_resume_fifo() {
    rt();
    let mutex = Arc::new(FiberMutex::new());
    let arrived = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(SpinLock::new(Vec::new()));
    let done = Arc::new(AtomicBool::new(false));

    let holder = {
        let mutex = mutex.clone();
        let arrived = arrived.clone();
        let done = done.clone();
        move |_: &strand_core::CancelToken| {
            let guard = mutex.lock().unwrap();
            // Contenders enqueue within their first run slice, so once
            // all have arrived they are all queued, in spawn order.
            while arrived.load(Ordering::SeqCst) < 3 {
                scheduler::yield_now();
            }
            drop(guard);
            done.store(true, Ordering::SeqCst);
        }
    };
    scheduler::spawn(holder).unwrap();

    for tag in 1..=3u32 {
        let mutex = mutex.clone();
        let arrived = arrived.clone();
        let order = order.clone();
        scheduler::spawn(move |_| {
            arrived.fetch_add(1, Ordering::SeqCst);
            let guard = mutex.lock().unwrap();
            order.lock().push(tag);
            drop(guard);
        })
        .unwrap();
    }

    assert!(wait_until(
        || order.lock().len() == 3,
        Duration::from_secs(5)
    ));
    assert_eq!(*order.lock(), vec![1, 2, 3]);
    assert!(wait_until(|| done.load(Ordering::SeqCst), Duration::from_secs(5)));
}

#[test]
fn test_condvar_wait_reholds_mutex() {
    rt();
    let mutex = Arc::new(FiberMutex::new());
    let cv = Arc::new(FiberCondvar::new());
    let flag = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(AtomicBool::new(false));

    {
        let (mutex, cv, flag, observed) =
            (mutex.clone(), cv.clone(), flag.clone(), observed.clone());
        scheduler::spawn(move |_| {
            let mut guard = mutex.lock().unwrap();
            while !flag.load(Ordering::SeqCst) {
                guard = cv.wait(guard).unwrap();
            }
            // Holding the mutex again here is the contract under test:
            // the producer cannot sneak in between wake and return.
            assert!(mutex.try_lock().is_none());
            drop(guard);
            observed.store(true, Ordering::SeqCst);
        })
        .unwrap();
    }

    {
        let (mutex, cv, flag) = (mutex.clone(), cv.clone(), flag.clone());
        scheduler::spawn(move |_| {
            // Let the consumer park first.
            scheduler::sleep(Duration::from_millis(20)).unwrap();
            let guard = mutex.lock().unwrap();
            flag.store(true, Ordering::SeqCst);
            cv.notify_one();
            drop(guard);
        })
        .unwrap();
    }

    assert!(wait_until(
        || observed.load(Ordering::SeqCst),
        Duration::from_secs(5)
    ));
}

#[test]
fn test_rwlock_readers_share_writer_excludes() {
    rt();
    let rw = Arc::new(FiberRwLock::new());
    let concurrent = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let writer_done = Arc::new(AtomicBool::new(false));
    let readers_done = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let rw = rw.clone();
        let concurrent = concurrent.clone();
        let peak = peak.clone();
        let writer_done = writer_done.clone();
        let readers_done = readers_done.clone();
        scheduler::spawn(move |_| {
            let guard = rw.lock_shared().unwrap();
            let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            // The writer must not run while we hold the shared lock.
            assert!(!writer_done.load(Ordering::SeqCst));
            scheduler::sleep(Duration::from_millis(30)).unwrap();
            concurrent.fetch_sub(1, Ordering::SeqCst);
            drop(guard);
            readers_done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    {
        let rw = rw.clone();
        let writer_done = writer_done.clone();
        let concurrent = concurrent.clone();
        scheduler::spawn(move |_| {
            scheduler::sleep(Duration::from_millis(5)).unwrap();
            let guard = rw.lock().unwrap();
            assert_eq!(concurrent.load(Ordering::SeqCst), 0);
            writer_done.store(true, Ordering::SeqCst);
            drop(guard);
        })
        .unwrap();
    }

    assert!(wait_until(
        || writer_done.load(Ordering::SeqCst) && readers_done.load(Ordering::SeqCst) == 2,
        Duration::from_secs(5)
    ));
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cancellation_surfaces_at_suspension_point() {
    rt();
    let outcome = Arc::new(SpinLock::new(None));
    let o = outcome.clone();
    let id = scheduler::spawn(move |_| {
        let res = scheduler::sleep(Duration::from_secs(3600));
        *o.lock() = Some(res);
    })
    .unwrap();

    // Let it park, then cancel.
    std::thread::sleep(Duration::from_millis(30));
    scheduler::cancel_fiber(id);

    assert!(wait_until(
        || outcome.lock().is_some(),
        Duration::from_secs(5)
    ));
    assert_eq!(*outcome.lock(), Some(Err(SchedError::Cancelled)));
}
