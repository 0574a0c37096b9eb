//! Meta: the immutable-per-generation snapshot owning the index ring, the
//! page array, and the migration coordination fields (§3).
//!
//! Every mutating or reading operation begins by loading the map's current
//! `Meta` via its `AtomicRef`, performs its work against that snapshot, and
//! retries against the newly-installed `Meta` if a migration completed
//! mid-operation.

use std::sync::atomic::{AtomicU8, AtomicUsize};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;

use crate::node::NodeLayout;
use crate::page::Page;
use crate::primitives::{AtomicInt, Event};
use crate::sync::{AtomicU64, Ordering};

/// A participant's state during a migration's `common_migrate` phase.
pub const PARTICIPANT_NOT_STARTED: u8 = 0;
pub const PARTICIPANT_BEGIN: u8 = 1;
pub const PARTICIPANT_DONE: u8 = 2;

/// Migration coordination state, installed fresh on every `Meta` so that a
/// migration in progress never shares mutable state with the generation it
/// supersedes.
pub struct MigrationState<K, V> {
    /// Thread-id-like token of the migration leader; `0` while no migration
    /// is in progress. Accessors CAS their own non-zero token in to become
    /// leader (§3, §4.10).
    pub leader: AtomicU64,
    /// The next-generation `Meta`, published by the leader once allocated.
    pub new_gen_metadata: ArcSwapOption<Meta<K, V>>,
    /// Monotonic cursor over the old index, claimed in
    /// `blockwise_migrate_size` chunks by `fetch_add` during
    /// `common_migrate`.
    pub node_to_migrate: AtomicInt,
    /// One slot per registered accessor, tracking its progress through
    /// `common_migrate` (`PARTICIPANT_*`).
    pub participants: RwLock<Vec<AtomicU8>>,
    pub participants_count: AtomicUsize,
    /// Signalled once the leader has published `new_gen_metadata`.
    pub new_metadata_ready: Event,
    /// Signalled once every participant has rehashed its share of the old
    /// index.
    pub node_migration_done: Event,
    /// Signalled once the leader has installed the new `Meta` as current.
    pub migration_done: Event,
}

impl<K, V> MigrationState<K, V> {
    fn new() -> Self {
        MigrationState {
            leader: AtomicU64::new(0),
            new_gen_metadata: ArcSwapOption::default(),
            node_to_migrate: AtomicInt::new(0),
            participants: RwLock::new(Vec::new()),
            participants_count: AtomicUsize::new(0),
            new_metadata_ready: Event::new(),
            node_migration_done: Event::new(),
            migration_done: Event::new(),
        }
    }

    /// Whether a migration is currently in progress on this generation.
    pub fn in_progress(&self) -> bool {
        self.leader.load(Ordering::Acquire) != 0
    }
}

/// An immutable-per-generation snapshot of the map's index ring, page
/// array, and migration bookkeeping.
pub struct Meta<K, V> {
    /// Stable identifier of the owning map, used by accessor storage's
    /// thread-local registry to find the right per-thread state without
    /// depending on per-generation identity.
    pub map_id: u64,
    /// `log2` of the index ring's length.
    pub log_size: u32,
    /// Opaque marker distinguishing this snapshot from any other; a fresh
    /// generation always gets a strictly greater value.
    pub generation: u64,
    /// The index ring: `2^log_size` nodes, Robin-Hood open addressed.
    pub index: Vec<AtomicU64>,
    /// Pages allocated so far. Shared by `Arc` with the next generation
    /// during grow (pages are reused, not copied); exclusively owned after
    /// a shrink drops references to unused pages.
    pub pages: RwLock<Vec<Arc<Page<K, V>>>>,
    /// Index of the current hot page accepting reservations.
    pub inserting_page: AtomicUsize,
    pub greatest_allocated_page: AtomicUsize,
    pub greatest_deleted_page: AtomicUsize,
    pub greatest_refilled_page: AtomicUsize,
    pub migration: MigrationState<K, V>,
}

impl<K, V> Meta<K, V> {
    /// Builds a fresh, empty `Meta` at the given `log_size`, with one
    /// pre-allocated page (so index 0 -- forbidden as a payload -- has
    /// somewhere to "live" without special-casing page lookups).
    #[must_use]
    pub fn fresh(map_id: u64, log_size: u32, generation: u64) -> Self {
        let size = 1usize << log_size;
        let index = (0..size).map(|_| AtomicU64::new(0)).collect();
        let first_page = Arc::new(Page::new());
        // Guard entry 0 so it is never handed out by the reservation
        // protocol (invariant 3, §3).
        first_page.slot(0).try_reserve();

        Meta {
            map_id,
            log_size,
            generation,
            index,
            pages: RwLock::new(vec![first_page]),
            inserting_page: AtomicUsize::new(0),
            greatest_allocated_page: AtomicUsize::new(0),
            greatest_deleted_page: AtomicUsize::new(usize::MAX),
            greatest_refilled_page: AtomicUsize::new(usize::MAX),
            migration: MigrationState::new(),
        }
    }

    #[must_use]
    pub fn layout(&self) -> NodeLayout {
        NodeLayout::new(self.log_size)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        1usize << self.log_size
    }

    /// Loads the raw node word at `ix` (masked into range).
    pub fn read_node(&self, ix: u64) -> u64 {
        self.index[(ix as usize) & (self.size() - 1)].load(Ordering::Acquire)
    }

    /// Attempts to CAS the raw node word at `ix` from `expected` to `desired`.
    pub fn cas_node(&self, ix: u64, expected: u64, desired: u64) -> Result<u64, u64> {
        self.index[(ix as usize) & (self.size() - 1)].compare_exchange(
            expected,
            desired,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
    }

    /// Non-atomic write, used only when the caller is the sole logical
    /// owner of the position (e.g. writing a tombstone immediately after
    /// this thread's own successful delete CAS on the entry, §4.6).
    pub fn write_node(&self, ix: u64, raw: u64) {
        self.index[(ix as usize) & (self.size() - 1)].store(raw, Ordering::Release);
    }

    #[must_use]
    pub fn page_at(&self, page_ix: usize) -> Option<Arc<Page<K, V>>> {
        self.pages.read().get(page_ix).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_meta_has_correct_size() {
        let meta: Meta<i64, i64> = Meta::fresh(1, 6, 0);
        assert_eq!(meta.size(), 64);
        assert_eq!(meta.index.len(), 64);
    }

    #[test]
    fn entry_zero_is_pre_reserved() {
        let meta: Meta<i64, i64> = Meta::fresh(1, 6, 0);
        let page = meta.page_at(0).unwrap();
        assert!(page.slot(0).is_claimed());
    }

    #[test]
    fn node_cas_roundtrips() {
        let meta: Meta<i64, i64> = Meta::fresh(1, 6, 0);
        assert_eq!(meta.read_node(3), 0);
        meta.cas_node(3, 0, 42).unwrap();
        assert_eq!(meta.read_node(3), 42);
        assert!(meta.cas_node(3, 0, 99).is_err());
    }
}
