//! The public surface: [`ConcurrentMap`] and its cheap-to-clone [`Handle`]
//! (§6 "External interfaces").
//!
//! Every mutating or size-sensitive operation follows the same shape: load
//! the current [`Meta`], attempt the operation against it, and on
//! [`crate::insert::InsertOutcome::MustGrow`] (or the equivalent from
//! `lookup`/`delete`) call [`migration::grow`] and retry. Growth is the only
//! automatic migration; shrinking is always an explicit [`Self::compact`]
//! call (§[FULL] Open Question: shrink trigger).

use std::hash::{BuildHasher, Hash, Hasher};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering as StdOrdering};
use std::sync::Arc;

use crate::batch;
use crate::config::MapConfig;
use crate::delete;
use crate::error::Result;
use crate::expectation::Expectation;
use crate::insert::{self, InsertOutcome};
use crate::iter::FastIter;
use crate::lookup;
use crate::migration;
use crate::reduce;
use crate::state::MapState;

static NEXT_MAP_ID: AtomicU64 = AtomicU64::new(1);

/// A thread-safe, open-addressed concurrent hash map.
///
/// `ConcurrentMap` is always handed out behind an `Arc` (see [`Self::new`]):
/// every accessor -- including the migration leader -- needs to keep a
/// strong reference to the map alive independent of whoever constructed it,
/// the same way the original runtime pins a map for as long as any thread
/// holds a handle to it (§3).
pub struct ConcurrentMap<K, V, S = std::collections::hash_map::RandomState> {
    state: MapState<K, V>,
    hash_builder: S,
}

impl<K, V> ConcurrentMap<K, V, std::collections::hash_map::RandomState> {
    /// Creates a map with the default configuration and hasher.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_hasher(std::collections::hash_map::RandomState::new())
    }

    /// Creates a map with the given configuration, validated up front.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidParameter`] if `config` fails
    /// [`MapConfig::validate`].
    pub fn with_config(config: MapConfig) -> Result<Arc<Self>> {
        Self::with_config_and_hasher(config, std::collections::hash_map::RandomState::new())
    }
}

impl<K, V, S> ConcurrentMap<K, V, S>
where
    S: BuildHasher,
{
    /// Creates a map with the default configuration and a caller-supplied
    /// hasher.
    #[must_use]
    pub fn with_hasher(hash_builder: S) -> Arc<Self> {
        Self::with_config_and_hasher(MapConfig::default(), hash_builder)
            .expect("default configuration is always valid")
    }

    /// Creates a map with the given configuration and hasher.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidParameter`] if `config` fails
    /// [`MapConfig::validate`].
    pub fn with_config_and_hasher(config: MapConfig, hash_builder: S) -> Result<Arc<Self>> {
        let config = config.validate()?;
        let map_id = NEXT_MAP_ID.fetch_add(1, StdOrdering::Relaxed);
        Ok(Arc::new(ConcurrentMap {
            state: MapState::new(map_id, config),
            hash_builder,
        }))
    }

    fn hash_of(&self, key: &K) -> i64
    where
        K: Hash,
    {
        let mut hasher = self.hash_builder.build_hasher();
        key.hash(&mut hasher);
        hasher.finish() as i64
    }

    fn accessor(&self) -> Arc<crate::accessor::AccessorStorage> {
        self.state.accessors.accessor_for(self.state.map_id)
    }

    /// Looks up `key`, cloning its current value if present.
    pub fn get(&self, key: &K) -> Option<V>
    where
        K: Hash + PartialEq,
        V: Clone,
    {
        let hash = self.hash_of(key);
        let meta = self.state.current_meta();
        lookup::lookup(&meta, hash, key).and_then(|e| e.value.clone())
    }

    /// Looks up `key`, returning `default` (without inserting it) if absent.
    pub fn get_or_default(&self, key: &K, default: V) -> V
    where
        K: Hash + PartialEq,
        V: Clone,
    {
        self.get(key).unwrap_or(default)
    }

    /// Unconditionally inserts or overwrites `key`'s value (`expected =
    /// Any`, §4.5).
    pub fn set(&self, key: &K, value: V)
    where
        K: Clone + Hash + PartialEq,
        V: Clone + PartialEq,
    {
        let _ = self.compare_and_set(key, Expectation::Any, value);
    }

    /// Performs the unified expectation-checked insert/update. Retries
    /// internally on `MustGrow`, growing the index each time, so the only
    /// outcomes a caller observes are `Inserted`, `Replaced`, or
    /// `ExpectationFailed` (§4.5).
    pub fn compare_and_set(
        &self,
        key: &K,
        expected: Expectation<V>,
        desired: V,
    ) -> crate::expectation::CasOutcome<V>
    where
        K: Clone + Hash + PartialEq,
        V: Clone + PartialEq,
    {
        let hash = self.hash_of(key);
        let accessor = self.accessor();
        loop {
            let meta = self.state.current_meta();
            match insert::expected_insert_or_update(
                &meta,
                &accessor,
                &self.state.config,
                hash,
                key,
                expected.clone(),
                desired.clone(),
            ) {
                InsertOutcome::Inserted => return crate::expectation::CasOutcome::Inserted,
                InsertOutcome::Replaced(prev) => return crate::expectation::CasOutcome::Replaced(prev),
                InsertOutcome::ExpectationFailed => {
                    return crate::expectation::CasOutcome::ExpectationFailed
                }
                InsertOutcome::MustGrow => {
                    migration::grow(&self.state, &meta, &accessor);
                }
            }
        }
    }

    /// Removes `key`, returning its last value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::NotFound`] if the key is absent or
    /// already deleted.
    pub fn delete(&self, key: &K) -> Result<V>
    where
        K: Hash + PartialEq,
        V: Clone,
    {
        let hash = self.hash_of(key);
        let accessor = self.accessor();
        let meta = self.state.current_meta();
        delete::delete(&meta, &accessor, hash, key)
    }

    /// Groups `pairs` by key locally, then flushes each accumulated value
    /// against the map via `compare_and_set`, calling `aggregate(key,
    /// current, incoming)` every time it needs to combine a value with
    /// whatever the map currently holds (§4.7).
    ///
    /// `chunk_size == 0` uses the default chunk size.
    pub fn reduce<I, F>(&self, pairs: I, aggregate: F, chunk_size: usize)
    where
        K: Hash + Eq + Clone + PartialEq,
        V: Clone + PartialEq,
        I: IntoIterator<Item = (K, V)>,
        F: FnMut(&K, Option<&V>, V) -> V,
    {
        let accessor = self.accessor();
        let hash_builder = &self.hash_builder;
        reduce::reduce(
            &self.state,
            &accessor,
            |k: &K| {
                let mut hasher = hash_builder.build_hasher();
                k.hash(&mut hasher);
                hasher.finish() as i64
            },
            pairs,
            aggregate,
            chunk_size,
        );
    }

    /// Looks up every key in `keys`, returning one `Option<V>` per key in
    /// the same order. Restarts the whole batch if a migration is observed
    /// mid-scan (§4.8). `chunk_size == 0` uses the default chunk size.
    pub fn batch_get(&self, keys: &[K], chunk_size: usize) -> Vec<Option<V>>
    where
        K: Hash + PartialEq,
        V: Clone,
    {
        let hash_builder = &self.hash_builder;
        batch::batch_get(
            &self.state,
            |k: &K| {
                let mut hasher = hash_builder.build_hasher();
                k.hash(&mut hasher);
                hasher.finish() as i64
            },
            keys,
            chunk_size,
        )
    }

    /// Returns an iterator over one partition of the map's current
    /// snapshot, of `partitions` total. Every partition's union (in any
    /// order) covers every live key exactly once as of the snapshot taken
    /// when this iterator was created (§4.9).
    #[must_use]
    pub fn fast_iter(&self, partitions: usize, this_partition: usize) -> FastIter<K, V> {
        FastIter::new(self.state.current_meta(), partitions, this_partition)
    }

    /// Sums the approximate per-accessor counters across every registered
    /// accessor. Not linearizable with concurrent writers (§4.11); this
    /// port has no global writer-exclusion lock, so unlike the source,
    /// `len()` never differs from this approximation (see DESIGN.md).
    #[must_use]
    pub fn approx_len(&self) -> i64 {
        self.state
            .accessors
            .snapshot()
            .iter()
            .map(|a| a.approx_len())
            .sum()
    }

    /// Returns the map's length. An alias for [`Self::approx_len`] in this
    /// port: see its doc comment.
    #[must_use]
    pub fn len(&self) -> i64 {
        self.approx_len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Triggers (or joins) a migration to the next `log_size`, capped at
    /// `max_log_size`. Growth also happens automatically whenever an
    /// operation's probe exceeds `MAX_DISTANCE`; this is for callers that
    /// want to pre-size the map ahead of a known bulk insert.
    pub fn grow(&self) {
        let accessor = self.accessor();
        let observed = self.state.current_meta();
        migration::grow(&self.state, &observed, &accessor);
    }

    /// Explicitly compacts the map to `max(log_size - 1, min_log_size)`,
    /// dropping any tombstones accumulated since the last migration.
    pub fn compact(&self) {
        let accessor = self.accessor();
        migration::compact(&self.state, &accessor);
    }
}

impl<K, V, S> ConcurrentMap<K, V, S> {
    /// Returns a cheap, `Clone`-able handle sharing this map's state.
    #[must_use]
    pub fn get_handle(self: &Arc<Self>) -> Handle<K, V, S> {
        Handle(Arc::clone(self))
    }
}

macro_rules! reduce_operator {
    ($name:ident, $trait_bound:ident, $op:tt) => {
        impl<K, V, S> ConcurrentMap<K, V, S>
        where
            K: Hash + Eq + Clone + PartialEq,
            V: Clone + PartialEq + std::ops::$trait_bound<Output = V>,
            S: BuildHasher,
        {
            /// Folds `pairs` into the map using the
            #[doc = concat!("`", stringify!($op), "` operator,")]
            /// treating an absent key as the incoming value itself (§4.7's
            /// "reduce" family of convenience wrappers).
            pub fn $name<I>(&self, pairs: I, chunk_size: usize)
            where
                I: IntoIterator<Item = (K, V)>,
            {
                self.reduce(
                    pairs,
                    |_k, current, incoming| match current {
                        Some(c) => c.clone() $op incoming,
                        None => incoming,
                    },
                    chunk_size,
                );
            }
        }
    };
}

reduce_operator!(reduce_sum, Add, +);
reduce_operator!(reduce_and, BitAnd, &);
reduce_operator!(reduce_or, BitOr, |);

impl<K, V, S> ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone + PartialEq,
    V: Clone + PartialEq + Ord,
    S: BuildHasher,
{
    /// Folds `pairs` into the map, keeping the maximum value seen per key.
    pub fn reduce_max<I>(&self, pairs: I, chunk_size: usize)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.reduce(
            pairs,
            |_k, current, incoming| match current {
                Some(c) if *c > incoming => c.clone(),
                _ => incoming,
            },
            chunk_size,
        );
    }

    /// Folds `pairs` into the map, keeping the minimum value seen per key.
    pub fn reduce_min<I>(&self, pairs: I, chunk_size: usize)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.reduce(
            pairs,
            |_k, current, incoming| match current {
                Some(c) if *c < incoming => c.clone(),
                _ => incoming,
            },
            chunk_size,
        );
    }
}

impl<K, S> ConcurrentMap<K, i64, S>
where
    K: Hash + Eq + Clone + PartialEq,
    S: BuildHasher,
{
    /// Counts occurrences of each key in `keys`, adding to whatever count
    /// the map already holds. A specialization of [`Self::reduce`] for
    /// `V = i64`, since a generic "count" has no meaningful definition over
    /// an arbitrary value type.
    pub fn reduce_count<I>(&self, keys: I, chunk_size: usize)
    where
        I: IntoIterator<Item = K>,
    {
        self.reduce(
            keys.into_iter().map(|k| (k, 1i64)),
            |_k, current, incoming| current.copied().unwrap_or(0) + incoming,
            chunk_size,
        );
    }
}

impl<K, T, S> ConcurrentMap<K, Vec<T>, S>
where
    K: Hash + Eq + Clone + PartialEq,
    T: Clone + PartialEq,
    S: BuildHasher,
{
    /// Appends each incoming value onto a per-key list, creating it if
    /// absent. A specialization of [`Self::reduce`] for `V = Vec<T>`, the
    /// list-building counterpart to `reduce_count`.
    pub fn reduce_list<I>(&self, pairs: I, chunk_size: usize)
    where
        I: IntoIterator<Item = (K, T)>,
    {
        self.reduce(
            pairs,
            |_k, current, incoming| {
                let mut list = current.cloned().unwrap_or_default();
                list.push(incoming);
                list
            },
            chunk_size,
        );
    }
}

/// A cheap, `Clone`-able handle onto a [`ConcurrentMap`], sharing its state
/// via `Arc` (§6). Dereferences to the map itself.
pub struct Handle<K, V, S = std::collections::hash_map::RandomState>(Arc<ConcurrentMap<K, V, S>>);

impl<K, V, S> Clone for Handle<K, V, S> {
    fn clone(&self) -> Self {
        Handle(Arc::clone(&self.0))
    }
}

impl<K, V, S> Deref for Handle<K, V, S> {
    type Target = ConcurrentMap<K, V, S>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
