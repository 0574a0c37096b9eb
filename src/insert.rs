//! The unified insert/update/compare-and-set primitive (§4.5).
//!
//! `set(k, v)` is `expected_insert_or_update(.., Expectation::Any, v)`;
//! `compare_and_set` passes through the caller's `Expectation` directly.
//! Both share one probe loop with [`crate::lookup::probe`]'s structure, but
//! this one also has to reserve and publish new entries and retry lost CAS
//! races in place rather than merely reporting a read result.

use crate::accessor::AccessorStorage;
use crate::alloc::reserve_entry;
use crate::config::MapConfig;
use crate::expectation::Expectation;
use crate::meta::Meta;
use crate::node::{is_empty, is_tombstone};
use crate::page::{page_and_offset, EntryData};
use crate::rehash::{distance_0, rehash};
use crate::sync::Ordering;

/// Outcome of `expected_insert_or_update` (§4.5).
#[derive(Debug, Clone)]
pub enum InsertOutcome<V> {
    /// The key was absent (or tombstoned); `desired` was stored fresh.
    Inserted,
    /// The key was present with this previous value; it now holds `desired`.
    Replaced(V),
    /// `expected` did not match the key's current state.
    ExpectationFailed,
    /// The probe exceeded `MAX_DISTANCE` without resolving; the caller must
    /// grow the index and retry the whole operation.
    MustGrow,
}

/// Performs the unified expectation-checked insert/update against `meta`.
/// `accessor` supplies the reservation buffer for brand-new entries.
pub fn expected_insert_or_update<K, V>(
    meta: &Meta<K, V>,
    accessor: &AccessorStorage,
    config: &MapConfig,
    hash: i64,
    key: &K,
    expected: Expectation<V>,
    desired: V,
) -> InsertOutcome<V>
where
    K: Clone + PartialEq,
    V: Clone + PartialEq,
{
    let layout = meta.layout();
    let rehashed = rehash(hash);
    let d0 = distance_0(hash, meta.log_size);
    let tag = layout.tag_of(rehashed);
    let max_distance = layout.max_distance();
    let size = meta.size() as u64;

    let mut distance = 0u64;
    loop {
        if distance >= max_distance || distance >= size {
            return InsertOutcome::MustGrow;
        }
        let index_pos = (d0 + distance) & (size - 1);
        let raw = meta.read_node(index_pos);

        if is_empty(raw) {
            if !expected.is_satisfied_by(None) {
                return InsertOutcome::ExpectationFailed;
            }
            let Some(loc) = reserve_entry(meta, accessor, config) else {
                return InsertOutcome::MustGrow;
            };
            let (page_ix, offset) = page_and_offset(loc.location);
            let Some(page) = meta.page_at(page_ix) else {
                // Reservation always targets an existing page; this would
                // only happen under a corrupted meta.
                distance += 1;
                continue;
            };
            page.slot(offset).publish(EntryData {
                hash,
                key: key.clone(),
                value: Some(desired.clone()),
            });
            let new_raw = layout.encode(loc.location, tag);
            match meta.cas_node(index_pos, 0, new_raw) {
                Ok(_) => {
                    accessor.local_inserted.fetch_add(1, Ordering::Relaxed);
                    accessor.local_len.fetch_add(1, Ordering::Relaxed);
                    return InsertOutcome::Inserted;
                }
                Err(_) => {
                    // Lost the race for this slot. The entry we just
                    // published is simply unreachable from the index -- a
                    // harmless leaked reservation (§7 point 5), reclaimed on
                    // the next migration. Re-read and retry this position.
                    continue;
                }
            }
        }

        if is_tombstone(raw, &layout) {
            distance += 1;
            continue;
        }

        let node = layout.decode(raw);
        if node.tag != tag {
            distance += 1;
            continue;
        }

        let (page_ix, offset) = page_and_offset(node.entry_index);
        let Some(page) = meta.page_at(page_ix) else {
            distance += 1;
            continue;
        };
        let slot = page.slot(offset);
        let Some(mut current) = slot.load() else {
            distance += 1;
            continue;
        };
        if current.hash != hash || &current.key != key {
            distance += 1;
            continue;
        }

        // Tag + hash + key all match: this slot belongs to `key`, whether
        // currently live or entry-tombstoned. Loop here (not the outer
        // probe) on a lost value CAS.
        loop {
            if !expected.is_satisfied_by(current.value.as_ref()) {
                return InsertOutcome::ExpectationFailed;
            }
            let previous = current.value.clone();
            match slot.compare_and_set_value(&current, Some(desired.clone())) {
                Ok(()) => {
                    return match previous {
                        Some(v) => InsertOutcome::Replaced(v),
                        None => {
                            accessor.local_inserted.fetch_add(1, Ordering::Relaxed);
                            accessor.local_len.fetch_add(1, Ordering::Relaxed);
                            InsertOutcome::Inserted
                        }
                    };
                }
                Err(actual) => {
                    current = actual;
                    continue;
                }
            }
        }
    }
}
