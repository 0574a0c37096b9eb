//! Thin wrappers for the atomic primitives the map's host runtime would
//! otherwise supply (§1 "Out of scope (external collaborators)"; §9
//! "Global mutable state").
//!
//! The specification treats `AtomicInt`, `AtomicRef`, `AtomicEvent`, the
//! partitioned FIFO queue, and the thread-local handle wrapper as interfaces
//! the core *consumes*, not as part of the hard core itself. This crate has
//! no host runtime to borrow them from, so it ships minimal, fully working
//! implementations -- each a handful of atomic ops or a `Mutex`+`Condvar`
//! pair -- without elaborating them beyond what `meta.rs`/`migration.rs`
//! actually call.

use std::sync::Arc;

use arc_swap::ArcSwapAny;

use crate::sync::{AtomicI64, Condvar, Mutex, Ordering};

/// A single atomically-updated 64-bit signed integer, with the handful of
/// read-modify-write operations the map's bookkeeping needs (approximate
/// length accounting, page/migration cursors).
#[derive(Debug, Default)]
pub struct AtomicInt {
    value: AtomicI64,
}

impl AtomicInt {
    #[must_use]
    pub fn new(initial: i64) -> Self {
        AtomicInt {
            value: AtomicI64::new(initial),
        }
    }

    pub fn load(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn store(&self, v: i64) {
        self.value.store(v, Ordering::Release);
    }

    pub fn fetch_add(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::AcqRel)
    }

    pub fn compare_exchange(&self, current: i64, new: i64) -> Result<i64, i64> {
        self.value
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }
}

/// A single-cell atomic reference with compare-and-set, backing the map's
/// current-`Meta` pointer (§3). A thin, named wrapper over `arc-swap`'s
/// `ArcSwapAny` so call sites read as "the meta reference" rather than a
/// raw library type.
pub struct AtomicRef<T> {
    inner: ArcSwapAny<Arc<T>>,
}

impl<T> AtomicRef<T> {
    #[must_use]
    pub fn new(initial: Arc<T>) -> Self {
        AtomicRef {
            inner: ArcSwapAny::new(initial),
        }
    }

    /// Loads a strong reference to the currently installed value.
    #[must_use]
    pub fn load(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Atomically replaces the current value with `new` if it is still
    /// pointer-identical to `current`. Returns `Ok(())` on success, or
    /// `Err(actual)` with the value actually found on failure.
    ///
    /// # Errors
    ///
    /// Returns the current value when another thread already replaced it.
    pub fn compare_and_set(&self, current: &Arc<T>, new: Arc<T>) -> Result<(), Arc<T>> {
        let previous = self.inner.compare_and_swap(current, new);
        if Arc::ptr_eq(&*previous, current) {
            Ok(())
        } else {
            Err(Arc::clone(&*previous))
        }
    }
}

/// A thread-parking event with `set`/`wait`/`is_set`, used for migration
/// handoff (§4.10, §5 "Suspension points"). Ported from `atomic_event.c`'s
/// role: once-settable, broadcast-on-set, idempotent.
#[derive(Default)]
pub struct Event {
    state: Mutex<bool>,
    condvar: Condvar,
}

impl Event {
    #[must_use]
    pub fn new() -> Self {
        Event {
            state: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Sets the event and wakes every waiter. Idempotent: setting an
    /// already-set event is a no-op.
    pub fn set(&self) {
        let mut guard = self.state.lock().expect("event mutex poisoned");
        if !*guard {
            *guard = true;
            self.condvar.notify_all();
        }
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.state.lock().expect("event mutex poisoned")
    }

    /// Blocks the calling thread until the event is set. Returns
    /// immediately if it is already set.
    pub fn wait(&self) {
        let mut guard = self.state.lock().expect("event mutex poisoned");
        while !*guard {
            guard = self.condvar.wait(guard).expect("event mutex poisoned");
        }
    }
}

/// A bounded multi-producer, single-consumer-per-partition FIFO queue,
/// partitioned by a caller-chosen key so independent consumers never
/// contend on the same channel. Specified in §1 as a surrounding primitive
/// the core only needs as an interface; this crate backs it with
/// `crossbeam-channel`; per-partition bounded channel, matching the
/// original `atomic_partitioned_queue`'s producer/consumer split
/// (`atomic_partitioned_queue/producer.c`, `consumer.c`).
pub struct PartitionedQueue<T> {
    partitions: Vec<(crossbeam_channel::Sender<T>, crossbeam_channel::Receiver<T>)>,
}

impl<T> PartitionedQueue<T> {
    /// Creates a queue with `partitions` independent channels, each with
    /// the given per-partition capacity.
    #[must_use]
    pub fn new(partitions: usize, capacity: usize) -> Self {
        let partitions = (0..partitions.max(1))
            .map(|_| crossbeam_channel::bounded(capacity.max(1)))
            .collect();
        PartitionedQueue { partitions }
    }

    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Sends `value` on the given partition. Blocks if that partition's
    /// channel is full.
    ///
    /// # Panics
    ///
    /// Panics if `partition` is out of range, or if the receiving end has
    /// been dropped.
    pub fn send(&self, partition: usize, value: T) {
        self.partitions[partition]
            .0
            .send(value)
            .expect("partitioned queue receiver dropped");
    }

    /// Receives the next value from the given partition, blocking until
    /// one is available or the queue is closed.
    #[must_use]
    pub fn recv(&self, partition: usize) -> Option<T> {
        self.partitions[partition].1.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_int_fetch_add_accumulates() {
        let counter = AtomicInt::new(0);
        for _ in 0..10 {
            counter.fetch_add(1);
        }
        assert_eq!(counter.load(), 10);
    }

    #[test]
    fn atomic_ref_cas_succeeds_on_match() {
        let a = Arc::new(1);
        let r = AtomicRef::new(Arc::clone(&a));
        let b = Arc::new(2);
        assert!(r.compare_and_set(&a, Arc::clone(&b)).is_ok());
        assert_eq!(*r.load(), 2);
    }

    #[test]
    fn atomic_ref_cas_fails_on_mismatch() {
        let a = Arc::new(1);
        let r = AtomicRef::new(Arc::clone(&a));
        let stale = Arc::new(1); // same value, different allocation
        let b = Arc::new(2);
        assert!(r.compare_and_set(&stale, b).is_err());
    }

    #[test]
    fn event_wait_returns_immediately_once_set() {
        let e = Event::new();
        assert!(!e.is_set());
        e.set();
        assert!(e.is_set());
        e.wait(); // must not block
    }

    #[test]
    fn partitioned_queue_routes_by_partition() {
        let q: PartitionedQueue<i32> = PartitionedQueue::new(2, 8);
        q.send(0, 1);
        q.send(1, 2);
        assert_eq!(q.recv(0), Some(1));
        assert_eq!(q.recv(1), Some(2));
    }
}
