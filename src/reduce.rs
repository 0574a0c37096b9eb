//! Group-by aggregation (§4.7): local-table + chunked flush.
//!
//! Builds a per-key `(expected, desired)` accumulator from the input pairs
//! using an in-memory [`rustc_hash::FxHashMap`] (non-adversarial, process-
//! local -- no need for the map's own Robin-Hood/CRC32 machinery here), then
//! flushes it against the map in chunks, retrying any `compare_and_set` that
//! lost a race by reloading the current value and re-aggregating against
//! it (§4.7 step 2).

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::accessor::AccessorStorage;
use crate::expectation::Expectation;
use crate::insert::{expected_insert_or_update, InsertOutcome};
use crate::lookup::lookup;
use crate::migration;
use crate::state::MapState;

const DEFAULT_CHUNK_SIZE: usize = 128;

struct LocalEntry<V> {
    expected: Expectation<V>,
    desired: V,
}

/// Aggregates `pairs` locally, then flushes the result against the map.
/// `chunk_size == 0` uses [`DEFAULT_CHUNK_SIZE`], matching `reduce`'s
/// default in §6.
pub fn reduce<K, V, I, F, H>(
    state: &MapState<K, V>,
    accessor: &AccessorStorage,
    hash_of: H,
    pairs: I,
    mut aggregate: F,
    chunk_size: usize,
) where
    K: Hash + Eq + Clone + PartialEq,
    V: Clone + PartialEq,
    I: IntoIterator<Item = (K, V)>,
    F: FnMut(&K, Option<&V>, V) -> V,
    H: Fn(&K) -> i64,
{
    let mut local: FxHashMap<K, LocalEntry<V>> = FxHashMap::default();

    for (key, value) in pairs {
        match local.get_mut(&key) {
            Some(entry) => {
                entry.desired = aggregate(&key, Some(&entry.desired), value);
            }
            None => {
                let desired = aggregate(&key, None, value);
                local.insert(
                    key,
                    LocalEntry {
                        expected: Expectation::NotFound,
                        desired,
                    },
                );
            }
        }
    }

    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };
    let entries: Vec<(K, LocalEntry<V>)> = local.into_iter().collect();

    for chunk in entries.chunks(chunk_size.max(1)) {
        for (key, entry) in chunk {
            flush_one(
                state,
                accessor,
                &hash_of,
                key,
                entry.expected.clone(),
                entry.desired.clone(),
                &mut aggregate,
            );
        }
    }
}

/// Flushes one key's accumulated `(expected, desired)` pair, retrying
/// against the map's latest state on every `ExpectationFailed` or
/// `MustGrow` until it lands.
fn flush_one<K, V, H, F>(
    state: &MapState<K, V>,
    accessor: &AccessorStorage,
    hash_of: &H,
    key: &K,
    mut expected: Expectation<V>,
    mut desired: V,
    aggregate: &mut F,
) where
    K: Clone + PartialEq,
    V: Clone + PartialEq,
    H: Fn(&K) -> i64,
    F: FnMut(&K, Option<&V>, V) -> V,
{
    let hash = hash_of(key);
    loop {
        let meta = state.current_meta();
        match expected_insert_or_update(
            &meta,
            accessor,
            &state.config,
            hash,
            key,
            expected.clone(),
            desired.clone(),
        ) {
            InsertOutcome::Inserted | InsertOutcome::Replaced(_) => return,
            InsertOutcome::ExpectationFailed => {
                let current = lookup(&meta, hash, key).and_then(|e| e.value.clone());
                desired = aggregate(key, current.as_ref(), desired);
                expected = match current {
                    Some(v) => Expectation::Value(v),
                    None => Expectation::NotFound,
                };
            }
            InsertOutcome::MustGrow => {
                migration::grow(state, &meta, accessor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::AccessorList;
    use crate::config::MapConfig;
    use crate::lookup::lookup;
    use std::hash::{BuildHasher, Hash as _, Hasher};

    fn hash_of(key: &&'static str) -> i64 {
        let mut hasher = std::collections::hash_map::RandomState::new().build_hasher();
        key.hash(&mut hasher);
        hasher.finish() as i64
    }

    #[test]
    fn reduce_sum_accumulates_across_duplicate_keys() {
        let state: MapState<&'static str, i64> = MapState::new(1, MapConfig::default());
        let accessor = state.accessors.accessor_for(1);

        reduce(
            &state,
            &accessor,
            hash_of,
            [("x", 10i64), ("y", 20), ("x", 5)],
            |_k, current, value| current.copied().unwrap_or(0) + value,
            0,
        );

        let meta = state.current_meta();
        assert_eq!(lookup(&meta, hash_of(&"x"), &"x").unwrap().value, Some(15));
        assert_eq!(lookup(&meta, hash_of(&"y"), &"y").unwrap().value, Some(20));
    }

    #[test]
    fn reduce_against_preexisting_value_reads_current_state() {
        let state: MapState<&'static str, i64> = MapState::new(1, MapConfig::default());
        let accessor = state.accessors.accessor_for(1);
        let meta = state.current_meta();
        crate::insert::expected_insert_or_update(
            &meta,
            &accessor,
            &state.config,
            hash_of(&"x"),
            &"x",
            Expectation::Any,
            1,
        );

        reduce(
            &state,
            &accessor,
            hash_of,
            [("x", 10i64)],
            |_k, current, value| current.copied().unwrap_or(0) + value,
            0,
        );

        let meta = state.current_meta();
        assert_eq!(lookup(&meta, hash_of(&"x"), &"x").unwrap().value, Some(11));
    }
}
