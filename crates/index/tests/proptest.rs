//! Property-based tests for marrow-index using proptest.

use std::collections::{BTreeMap, HashSet};

use marrow_core::{Key, Value};
use marrow_index::{
    BTreeIndex, HashIndex, Index, KeyComparator, KeyRange, Order, RangeIndex, SimpleComparator,
};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Add(i64, u64),
    Remove(i64),
    RemoveValue(i64, u64),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            3 => (0i64..200, 0u64..50).prop_map(|(k, v)| Op::Add(k, v)),
            1 => (0i64..200).prop_map(Op::Remove),
            1 => (0i64..200, 0u64..50).prop_map(|(k, v)| Op::RemoveValue(k, v)),
        ],
        1..400,
    )
}

/// Applies `ops` to a multi-valued index and to a `BTreeMap` model.
fn apply<I: Index<i64>>(index: &mut I, ops: &[Op]) -> BTreeMap<i64, Vec<u64>> {
    let mut model: BTreeMap<i64, Vec<u64>> = BTreeMap::new();
    for op in ops {
        match *op {
            Op::Add(k, v) => {
                index.add(k, v).unwrap();
                model.entry(k).or_default().push(v);
            }
            Op::Remove(k) => {
                index.remove(&k, None);
                model.remove(&k);
            }
            Op::RemoveValue(k, v) => {
                index.remove(&k, Some(v));
                if let Some(bucket) = model.get_mut(&k) {
                    bucket.retain(|&x| x != v);
                    if bucket.is_empty() {
                        model.remove(&k);
                    }
                }
            }
        }
    }
    model
}

proptest! {
    /// The B+Tree agrees with an ordered map model under mixed operations.
    #[test]
    fn btree_matches_model(ops in ops(), order in 4usize..16) {
        let mut tree = BTreeIndex::new(order, false);
        let model = apply(&mut tree, &ops);

        prop_assert_eq!(tree.len(), model.values().map(Vec::len).sum::<usize>());
        prop_assert_eq!(tree.key_count(), model.len());
        for (k, bucket) in &model {
            prop_assert_eq!(&tree.get(k), bucket);
        }
        let expected: Vec<u64> = model.values().flatten().copied().collect();
        prop_assert_eq!(tree.get_all(), expected);
    }

    /// The hash index agrees with the same model, ignoring key order.
    #[test]
    fn hash_matches_model(ops in ops()) {
        let mut index = HashIndex::new(false);
        let model = apply(&mut index, &ops);

        prop_assert_eq!(index.len(), model.values().map(Vec::len).sum::<usize>());
        prop_assert_eq!(index.key_count(), model.len());
        for (k, bucket) in &model {
            prop_assert_eq!(&index.get(k), bucket);
        }
        prop_assert!(!index.contains_key(&-1));
    }

    /// A unique index never holds two rows under one key, whichever variant.
    #[test]
    fn unique_indexes_reject_duplicates(keys in prop::collection::vec(0i64..100, 10..80)) {
        let mut tree = BTreeIndex::new(8, true);
        let mut hash = HashIndex::new(true);
        let mut inserted = HashSet::new();

        for (i, &key) in keys.iter().enumerate() {
            let fresh = inserted.insert(key);
            prop_assert_eq!(tree.add(key, i as u64).is_ok(), fresh);
            prop_assert_eq!(hash.add(key, i as u64).is_ok(), fresh);
        }
        prop_assert_eq!(tree.len(), inserted.len());
        prop_assert_eq!(hash.len(), inserted.len());
    }

    /// Range selects return exactly the model's range, in key order.
    #[test]
    fn btree_range_matches_model(
        keys in prop::collection::btree_set(-500i64..500, 0..200),
        lower in -600i64..600,
        upper in -600i64..600,
        lower_open in any::<bool>(),
        upper_open in any::<bool>(),
    ) {
        let mut tree = BTreeIndex::new(6, true);
        for &key in &keys {
            tree.add(key, (key + 1000) as u64).unwrap();
        }

        let expected: Vec<u64> = keys
            .iter()
            .copied()
            .filter(|&k| if lower_open { k > lower } else { k >= lower })
            .filter(|&k| if upper_open { k < upper } else { k <= upper })
            .map(|k| (k + 1000) as u64)
            .collect();
        prop_assert_eq!(tree.select_range(lower, upper, lower_open, upper_open), expected.clone());

        let mut reversed = expected;
        reversed.reverse();
        let range = KeyRange::bound(lower, upper, lower_open, upper_open);
        prop_assert_eq!(tree.get_range(&range, true, None, 0), reversed);
    }

    /// Descending trees enumerate keys largest first.
    #[test]
    fn btree_descending_order(keys in prop::collection::btree_set(0i64..1000, 1..200)) {
        let mut tree = BTreeIndex::with_comparator(5, true, SimpleComparator::desc());
        for &key in &keys {
            tree.add(key, key as u64).unwrap();
        }
        let expected: Vec<u64> = keys.iter().rev().map(|&k| k as u64).collect();
        prop_assert_eq!(tree.get_all(), expected);
    }

    /// Composite keys with a descending second component order as the
    /// equivalent (a, -b) pairs would.
    #[test]
    fn composite_keys_follow_component_orders(
        pairs in prop::collection::btree_set((0i64..10, 0i64..10), 1..60)
    ) {
        let cmp = KeyComparator::new(vec![Order::Asc, Order::Desc]);
        let mut tree = BTreeIndex::with_comparator(4, true, cmp);
        for (i, &(a, b)) in pairs.iter().enumerate() {
            tree.add(Key::new(vec![Value::Int64(a), Value::Int64(b)]), i as u64).unwrap();
        }

        let ids: Vec<(i64, i64)> = pairs.iter().copied().collect();
        let mut expected = ids.clone();
        expected.sort_by_key(|&(a, b)| (a, -b));
        let actual: Vec<(i64, i64)> = tree.get_all().into_iter().map(|id| ids[id as usize]).collect();
        prop_assert_eq!(actual, expected);
    }
}
