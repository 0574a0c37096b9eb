//! Shared mutable state behind [`crate::map::ConcurrentMap`]: the current
//! meta reference, the accessor registry, and configuration.
//!
//! Split out from `map.rs` so that `migration.rs`, `reduce.rs`, and
//! `batch.rs` can operate on it directly without depending on the public
//! `ConcurrentMap` wrapper type -- the same separation of "core state" from
//! "public surface" the spec draws between the map's internals and its
//! external interface (§6).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::accessor::AccessorList;
use crate::config::MapConfig;
use crate::meta::Meta;
use crate::primitives::AtomicRef;

pub struct MapState<K, V> {
    pub map_id: u64,
    pub meta: AtomicRef<Meta<K, V>>,
    pub accessors: AccessorList,
    pub config: MapConfig,
    next_generation: AtomicU64,
}

impl<K, V> MapState<K, V> {
    #[must_use]
    pub fn new(map_id: u64, config: MapConfig) -> Self {
        let meta = Meta::fresh(map_id, config.initial_log_size, 0);
        MapState {
            map_id,
            meta: AtomicRef::new(Arc::new(meta)),
            accessors: AccessorList::new(),
            config,
            next_generation: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn current_meta(&self) -> Arc<Meta<K, V>> {
        self.meta.load()
    }

    /// Allocates the next generation marker for a migration's new `Meta`.
    pub fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::AcqRel)
    }
}
