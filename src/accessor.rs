//! Per-thread accessor storage (§3 "Accessor storage").
//!
//! Every thread that touches a given map gets exactly one
//! [`AccessorStorage`], created lazily on first use and cached in a
//! thread-local registry keyed by the map's stable `map_id`. This is the
//! Rust-idiomatic stand-in for the original's `PyThread_tss`-based lookup
//! (§9 "Global mutable state"): rather than a raw TLS key dereferenced by
//! the runtime, each thread keeps a small `Vec` of `(map_id, handle)` pairs
//! -- almost always of length one -- and a linear scan finds the right one.

use std::cell::RefCell;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::reservation::ReservationBuffer;
use crate::sync::AtomicI64;

thread_local! {
    static REGISTRY: RefCell<Vec<(u64, Arc<AccessorStorage>)>> = const { RefCell::new(Vec::new()) };
}

/// Per-thread state tied to one map instance: local bookkeeping counters,
/// the reservation buffer, and a short lock used both for this thread's own
/// slow paths and by a migration leader coordinating across accessors
/// (§3, §5 "Suspension points").
pub struct AccessorStorage {
    /// Position of this accessor in the map's accessor list; doubles as its
    /// index into a generation's `participants` array during migration.
    pub accessor_ix: usize,
    /// Serializes this accessor's reservation buffer against concurrent
    /// access by a migration leader rewriting moved-page references into it
    /// (§4.10 step 3), and against this thread's own slow paths.
    pub self_mutex: Mutex<()>,
    pub local_len: AtomicI64,
    pub local_inserted: AtomicI64,
    pub local_tombstones: AtomicI64,
    pub reservation_buffer: Mutex<ReservationBuffer>,
}

impl AccessorStorage {
    fn new(accessor_ix: usize) -> Self {
        AccessorStorage {
            accessor_ix,
            self_mutex: Mutex::new(()),
            local_len: AtomicI64::new(0),
            local_inserted: AtomicI64::new(0),
            local_tombstones: AtomicI64::new(0),
            reservation_buffer: Mutex::new(ReservationBuffer::new()),
        }
    }

    /// Approximate count of live entries this accessor believes it has
    /// contributed: `local_inserted - local_tombstones`, used by
    /// `approx_len` (§4.11).
    pub fn approx_len(&self) -> i64 {
        self.local_len.load(crate::sync::Ordering::Relaxed)
    }
}

/// Registry of accessors for one map, guarded by a coarse lock taken only
/// on first-time registration (§5 "Suspension points": `accessors_lock`).
pub struct AccessorList {
    accessors: Mutex<Vec<Arc<AccessorStorage>>>,
    next_ix: AtomicUsize,
}

impl AccessorList {
    #[must_use]
    pub fn new() -> Self {
        AccessorList {
            accessors: Mutex::new(Vec::new()),
            next_ix: AtomicUsize::new(0),
        }
    }

    /// Returns this thread's accessor storage for the given map, creating
    /// and registering it on first use.
    pub fn accessor_for(&self, map_id: u64) -> Arc<AccessorStorage> {
        if let Some(existing) = REGISTRY.with(|r| {
            r.borrow()
                .iter()
                .find(|(id, _)| *id == map_id)
                .map(|(_, a)| Arc::clone(a))
        }) {
            return existing;
        }

        let mut guard = self.accessors.lock();
        let ix = self.next_ix.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        let storage = Arc::new(AccessorStorage::new(ix));
        guard.push(Arc::clone(&storage));
        drop(guard);

        REGISTRY.with(|r| r.borrow_mut().push((map_id, Arc::clone(&storage))));
        storage
    }

    /// Snapshot of all currently-registered accessors, for length
    /// aggregation and migration participant setup.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<AccessorStorage>> {
        self.accessors.lock().clone()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.accessors.lock().len()
    }
}

impl Default for AccessorList {
    fn default() -> Self {
        Self::new()
    }
}
