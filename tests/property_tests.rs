//! Property-based tests for the quantified invariants in §8.

use std::collections::HashMap;

use proptest::prelude::*;

use cereggii::ConcurrentMap;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A serial sequence of `set(k, v_i)` for the same key always leaves
    /// `get(k)` holding the last value written.
    #[test]
    fn serial_sets_leave_the_last_value_visible(
        values in proptest::collection::vec(any::<i64>(), 1..50)
    ) {
        let map = ConcurrentMap::<&'static str, i64>::new();
        for v in &values {
            map.set(&"k", *v);
        }
        prop_assert_eq!(map.get(&"k"), Some(*values.last().unwrap()));
    }

    /// `reduce_sum` over arbitrary `(key, value)` pairs, regardless of how
    /// they're chunked, equals the per-key sum computed directly.
    #[test]
    fn reduce_sum_matches_a_direct_fold_regardless_of_chunking(
        pairs in proptest::collection::vec((0i64..8, -100i64..100), 0..200),
        chunk_size in 1usize..64,
    ) {
        let map = ConcurrentMap::<i64, i64>::new();
        map.reduce_sum(pairs.clone(), chunk_size);

        let mut expected: HashMap<i64, i64> = HashMap::new();
        for (k, v) in &pairs {
            *expected.entry(*k).or_insert(0) += v;
        }

        for (k, v) in &expected {
            prop_assert_eq!(map.get(k), Some(*v));
        }
        for k in 0i64..8 {
            if !expected.contains_key(&k) {
                prop_assert_eq!(map.get(&k), None);
            }
        }
    }

    /// `set` followed immediately by `get` always round-trips, for any key
    /// and value, across a freshly constructed map.
    #[test]
    fn set_then_get_round_trips_for_any_key_and_value(
        key in any::<i64>(),
        value in any::<i64>(),
    ) {
        let map = ConcurrentMap::<i64, i64>::new();
        map.set(&key, value);
        prop_assert_eq!(map.get(&key), Some(value));
    }

    /// `set(k, v); delete(k)` always leaves the key absent, whatever `k`
    /// and `v` are.
    #[test]
    fn delete_after_set_leaves_the_key_absent(
        key in any::<i64>(),
        value in any::<i64>(),
    ) {
        let map = ConcurrentMap::<i64, i64>::new();
        map.set(&key, value);
        map.delete(&key).unwrap();
        prop_assert_eq!(map.get(&key), None);
    }

    /// An arbitrary interleaving of inserts and deletes across many keys
    /// always leaves `get` agreeing with a plain `HashMap` model replaying
    /// the same operations.
    #[test]
    fn arbitrary_insert_delete_sequence_matches_a_hashmap_model(
        ops in proptest::collection::vec((0i64..16, any::<bool>(), any::<i64>()), 0..300)
    ) {
        let map = ConcurrentMap::<i64, i64>::new();
        let mut model: HashMap<i64, i64> = HashMap::new();

        for (key, is_delete, value) in ops {
            if is_delete {
                let map_result = map.delete(&key);
                let model_result = model.remove(&key);
                match model_result {
                    Some(v) => prop_assert_eq!(map_result.ok(), Some(v)),
                    None => prop_assert!(map_result.is_err()),
                }
            } else {
                map.set(&key, value);
                model.insert(key, value);
            }
        }

        for key in 0i64..16 {
            prop_assert_eq!(map.get(&key), model.get(&key).copied());
        }
    }
}
