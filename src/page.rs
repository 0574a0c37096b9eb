//! Page pool: append-only pages of fixed-size entry records.
//!
//! A page is a contiguous array of [`ENTRIES_IN_PAGE`] entries, each padded
//! to a cache line to avoid false sharing between accessors reserving
//! adjacent slots. Pages are allocated lazily and linked into the meta by
//! index (§3, §4.3).

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::sync::{AtomicU8, Ordering};

/// Entries per page, matching the original's `ENTRIES_IN_PAGE`.
pub const ENTRIES_IN_PAGE: usize = 64;

/// `flags` bit marking a slot as claimed for a pending insert, before its
/// key/value become visible.
pub const RESERVED: u8 = 0x80;

/// A record in the map: `{hash, key, value}`. `value == None` marks a
/// logically deleted entry (tombstone at entry level); `(key, hash)` remain
/// stable for the entry's lifetime within a generation once `value` is
/// first set to `Some`.
///
/// Updates publish a whole new `EntryData` rather than mutating fields in
/// place -- this is the safe-Rust analogue of the original's per-field
/// atomic writes, and lets `(key, hash)` ride along unchanged on every
/// value-only update.
#[derive(Debug)]
pub struct EntryData<K, V> {
    pub hash: i64,
    pub key: K,
    pub value: Option<V>,
}

impl<K: Clone, V> EntryData<K, V> {
    fn with_value(&self, value: Option<V>) -> Self {
        EntryData {
            hash: self.hash,
            key: self.key.clone(),
            value,
        }
    }
}

/// One cache-line-padded entry slot.
///
/// Reads (`load`/`load_full`) are always lock-free, backed by
/// [`ArcSwapOption`]. Writes to an already-populated slot's value
/// (`compare_and_set_value`) serialize through a narrow per-slot mutex that
/// only ever guards a load-compare-store triple -- never a user callback or
/// I/O -- so contention is bounded to the handful of nanoseconds a genuine
/// hardware CAS would take. This is the crate's "almost" in
/// almost-lock-free: the index ring and lookups are fully lock-free; entry
/// value updates use this minimal serialization instead of depending on an
/// unstable double-wide CAS across `(key, hash, value)`.
#[repr(align(64))]
pub struct Slot<K, V> {
    flags: AtomicU8,
    data: ArcSwapOption<EntryData<K, V>>,
    write_lock: Mutex<()>,
}

impl<K, V> Default for Slot<K, V> {
    fn default() -> Self {
        Slot {
            flags: AtomicU8::new(0),
            data: ArcSwapOption::default(),
            write_lock: Mutex::new(()),
        }
    }
}

impl<K, V> Slot<K, V> {
    /// Attempts to claim this slot for a pending insert: flags `0 ->
    /// RESERVED` via CAS. Returns `true` on success.
    pub fn try_reserve(&self) -> bool {
        self.flags
            .compare_exchange(0, RESERVED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether this slot has been claimed (reserved or populated).
    pub fn is_claimed(&self) -> bool {
        self.flags.load(Ordering::Acquire) != 0
    }

    /// Publishes the entry data into a reserved slot. Must only be called
    /// after a successful [`Slot::try_reserve`] on this slot, and only
    /// once: this is the single release-store that makes `(hash, key)`
    /// stable for the rest of the slot's lifetime in this generation.
    pub fn publish(&self, data: EntryData<K, V>) {
        self.data.store(Some(Arc::new(data)));
    }

    /// Loads a strong reference to this slot's current entry data, if any
    /// has been published yet.
    pub fn load(&self) -> Option<Arc<EntryData<K, V>>> {
        self.data.load_full()
    }

    /// Compare-and-set the stored value on an already-populated slot,
    /// keeping `key`/`hash` unchanged. Fails (without blocking) if the
    /// slot's current data is not pointer-identical to `expected`, which
    /// happens whenever another writer updated the value since `expected`
    /// was observed -- the caller re-reads and retries, exactly like a
    /// failed hardware CAS.
    ///
    /// # Panics
    ///
    /// Panics if called before the slot has ever been published (there is
    /// no `expected` state to compare against).
    pub fn compare_and_set_value(
        &self,
        expected: &Arc<EntryData<K, V>>,
        new_value: Option<V>,
    ) -> Result<(), Arc<EntryData<K, V>>>
    where
        K: Clone,
    {
        let _guard = self.write_lock.lock();
        let current = self
            .data
            .load_full()
            .expect("compare_and_set_value called on an unpublished slot");
        if !Arc::ptr_eq(&current, expected) {
            return Err(current);
        }
        let desired = Arc::new(expected.with_value(new_value));
        self.data.store(Some(desired));
        Ok(())
    }
}

/// A contiguous array of [`ENTRIES_IN_PAGE`] entry slots.
pub struct Page<K, V> {
    slots: [Slot<K, V>; ENTRIES_IN_PAGE],
}

impl<K, V> Page<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Page {
            slots: std::array::from_fn(|_| Slot::default()),
        }
    }

    #[must_use]
    pub fn slot(&self, offset: usize) -> &Slot<K, V> {
        &self.slots[offset]
    }
}

impl<K, V> Default for Page<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a flat entry index into `(page, offset)`.
#[must_use]
pub fn page_and_offset(entry_index: u64) -> (usize, usize) {
    (
        (entry_index as usize) / ENTRIES_IN_PAGE,
        (entry_index as usize) % ENTRIES_IN_PAGE,
    )
}
