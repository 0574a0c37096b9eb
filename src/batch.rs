//! Batch get (§4.8): looks up many keys at once, restarting the whole
//! batch if the map's meta changes mid-scan.
//!
//! The original's prefetch-before-lookup optimization has no portable
//! stable-Rust equivalent (the prefetch intrinsics are nightly-only); this
//! chunking keeps the *shape* of the algorithm -- process in bounded
//! chunks, check for a meta change at chunk boundaries -- without the
//! prefetch hint itself (see DESIGN.md).

use std::sync::Arc;

use crate::lookup::lookup;
use crate::state::MapState;

const DEFAULT_CHUNK_SIZE: usize = 128;

/// Looks up every key in `keys`, returning one `Option<V>` per key in the
/// same order. Restarts from the beginning if a migration is observed
/// mid-batch (§4.8).
pub fn batch_get<K, V, H>(state: &MapState<K, V>, hash_of: H, keys: &[K], chunk_size: usize) -> Vec<Option<V>>
where
    K: PartialEq,
    V: Clone,
    H: Fn(&K) -> i64,
{
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    }
    .max(1);

    'restart: loop {
        let meta = state.current_meta();
        let mut results = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(chunk_size) {
            for key in chunk {
                let hash = hash_of(key);
                results.push(lookup(&meta, hash, key).and_then(|e| e.value.clone()));
            }
            if !Arc::ptr_eq(&meta, &state.current_meta()) {
                continue 'restart;
            }
        }

        return results;
    }
}
