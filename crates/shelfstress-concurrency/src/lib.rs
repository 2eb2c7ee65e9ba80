//! Concurrency primitives shared by the two non-phased modes (`Coarse` and
//! `FastAndFurious`) and by `PhasedUpdates`.
//!
//! [`FairLock<T>`] is a reader/writer lock with writer-preference: once a
//! writer is waiting, no new reader is admitted until it has run. `std`'s
//! `RwLock` makes no such promise, so readers actually touch the protected
//! value through an inner `RwLock` (for genuine concurrent reads) while an
//! outer `Mutex`+`Condvar` gate enforces admission order. Every acquisition's
//! wait time is recorded into a [`LatencyLog`].
//!
//! [`ChangeLog<E>`] and [`SnapshotCell<T>`] back `PhasedUpdates`: writers
//! append records instead of mutating live state, and a rebuilder folds them
//! into a fresh snapshot that's published with a single pointer swap.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, RwLock};

use shelfstress_latency::LatencyLog;
use shelfstress_time::Absolute;

struct Gate {
    writer_active: bool,
    writers_waiting: u32,
    active_readers: u32,
}

/// A fair reader/writer lock with writer non-starvation and contention
/// latency tracking.
pub struct FairLock<T> {
    data: RwLock<T>,
    gate: Mutex<Gate>,
    readers_cv: Condvar,
    writer_cv: Condvar,
    wait_log: Mutex<LatencyLog>,
}

impl<T> FairLock<T> {
    /// Wraps `value` behind a fresh fair lock. `wait_quantum_us` seeds the
    /// contention `LatencyLog`'s bucket quantum.
    pub fn new(value: T, wait_quantum_us: u64) -> Self {
        Self {
            data: RwLock::new(value),
            gate: Mutex::new(Gate { writer_active: false, writers_waiting: 0, active_readers: 0 }),
            readers_cv: Condvar::new(),
            writer_cv: Condvar::new(),
            wait_log: Mutex::new(LatencyLog::new(wait_quantum_us)),
        }
    }

    /// Runs `f` with shared access. Blocks while a writer holds or is
    /// waiting for the lock.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let start = Absolute::now();
        {
            let mut gate = self.gate.lock().expect("fair lock gate poisoned");
            while gate.writer_active || gate.writers_waiting > 0 {
                gate = self.readers_cv.wait(gate).expect("fair lock gate poisoned");
            }
            gate.active_readers += 1;
        }
        self.record_wait(start);

        let guard = self.data.read().expect("fair lock data poisoned");
        let result = f(&guard);
        drop(guard);

        let mut gate = self.gate.lock().expect("fair lock gate poisoned");
        gate.active_readers -= 1;
        if gate.active_readers == 0 {
            self.writer_cv.notify_all();
        }
        result
    }

    /// Runs `f` with exclusive access. Blocks until every current reader has
    /// released and no other writer holds the lock; once waiting, blocks
    /// further readers from being admitted ahead of it.
    pub fn write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let start = Absolute::now();
        {
            let mut gate = self.gate.lock().expect("fair lock gate poisoned");
            gate.writers_waiting += 1;
            while gate.writer_active || gate.active_readers > 0 {
                gate = self.writer_cv.wait(gate).expect("fair lock gate poisoned");
            }
            gate.writers_waiting -= 1;
            gate.writer_active = true;
        }
        self.record_wait(start);

        let mut guard = self.data.write().expect("fair lock data poisoned");
        let result = f(&mut guard);
        drop(guard);

        let mut gate = self.gate.lock().expect("fair lock gate poisoned");
        gate.writer_active = false;
        // Writer-preference: wake other waiting writers before readers.
        self.writer_cv.notify_all();
        self.readers_cv.notify_all();
        result
    }

    fn record_wait(&self, start: Absolute) {
        let elapsed = Absolute::now() - start;
        self.wait_log.lock().expect("fair lock wait log poisoned").record(elapsed.as_micros() as i64);
    }

    /// A snapshot of acquisition wait-time contention, for reporting.
    #[must_use]
    pub fn contention_snapshot(&self) -> LatencyLog {
        self.wait_log.lock().expect("fair lock wait log poisoned").clone()
    }
}

/// A mutex-protected append-at-tail/pop-at-head log of pending writes,
/// drained by the `PhasedUpdates` rebuilder.
pub struct ChangeLog<E> {
    inner: Mutex<VecDeque<E>>,
}

impl<E> Default for ChangeLog<E> {
    fn default() -> Self {
        Self { inner: Mutex::new(VecDeque::new()) }
    }
}

impl<E> ChangeLog<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pending change at the tail.
    pub fn append(&self, entry: E) {
        self.inner.lock().expect("change log mutex poisoned").push_back(entry);
    }

    /// Pops the oldest pending change, if any.
    pub fn pop(&self) -> Option<E> {
        self.inner.lock().expect("change log mutex poisoned").pop_front()
    }

    /// Atomically takes every pending change in order, leaving the log empty.
    pub fn drain(&self) -> Vec<E> {
        let mut guard = self.inner.lock().expect("change log mutex poisoned");
        guard.drain(..).collect()
    }

    /// True if no changes are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("change log mutex poisoned").is_empty()
    }
}

/// A mutex-protected pointer-swap cell: readers clone the `Arc` out under a
/// short critical section and then operate on an immutable snapshot with no
/// further synchronization. Superseded snapshots are reclaimed once their
/// last reader drops its `Arc`.
pub struct SnapshotCell<T> {
    current: Mutex<Arc<T>>,
}

impl<T> SnapshotCell<T> {
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self { current: Mutex::new(Arc::new(initial)) }
    }

    /// Clones out the current snapshot pointer.
    #[must_use]
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.lock().expect("snapshot cell mutex poisoned"))
    }

    /// Publishes a freshly built value as the new current snapshot.
    pub fn publish(&self, new_value: T) {
        *self.current.lock().expect("snapshot cell mutex poisoned") = Arc::new(new_value);
    }
}


/// Small-scale model of the gate's admission order, exhaustively explored by
/// loom rather than run against real threads. Kept separate from
/// [`FairLock`] because loom requires its own `Mutex`/`Condvar`; this models
/// just the invariant that matters, not the full lock.
#[cfg(loom)]
mod loom_tests {
    use loom::sync::{Mutex, Condvar};
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn writer_flag_and_reader_count_never_observed_together() {
        loom::model(|| {
            let writer_active = Arc::new((Mutex::new(false), Condvar::new()));
            let reader_count = Arc::new(Mutex::new(0usize));

            let w = {
                let writer_active = Arc::clone(&writer_active);
                let reader_count = Arc::clone(&reader_count);
                thread::spawn(move || {
                    let (lock, _cv) = &*writer_active;
                    let mut active = lock.lock().unwrap();
                    while *reader_count.lock().unwrap() > 0 {
                        drop(active);
                        active = lock.lock().unwrap();
                    }
                    *active = true;
                    assert_eq!(*reader_count.lock().unwrap(), 0);
                    *active = false;
                })
            };

            let r = {
                let writer_active = Arc::clone(&writer_active);
                let reader_count = Arc::clone(&reader_count);
                thread::spawn(move || {
                    let (lock, _cv) = &*writer_active;
                    if !*lock.lock().unwrap() {
                        *reader_count.lock().unwrap() += 1;
                        assert!(!*lock.lock().unwrap());
                        *reader_count.lock().unwrap() -= 1;
                    }
                })
            };

            w.join().unwrap();
            r.join().unwrap();
        });
    }
}
