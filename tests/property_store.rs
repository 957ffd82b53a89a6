//! Property-based tests for store invariants
//!
//! Random operation sequences are replayed against a `HashMap` model; the
//! store must agree with the model after every step.

use proptest::prelude::*;
use std::collections::HashMap;
use tablekv::Store;
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Op {
    Set(Vec<u8>, Vec<u8>),
    Erase(Vec<u8>),
    Rename(Vec<u8>, Vec<u8>),
}

fn small_key() -> impl Strategy<Value = Vec<u8>> {
    // Narrow alphabet so operations collide on the same keys often
    prop::collection::vec(0u8..4, 0..3)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (small_key(), prop::collection::vec(any::<u8>(), 0..64))
            .prop_map(|(k, v)| Op::Set(k, v)),
        small_key().prop_map(Op::Erase),
        (small_key(), small_key()).prop_map(|(a, b)| Op::Rename(a, b)),
    ]
}

fn scratch_store() -> (TempDir, Store) {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::create_at(temp_dir.path().join("prop.kv"), false).unwrap();
    (temp_dir, store)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_set_then_get(
        key in prop::collection::vec(any::<u8>(), 0..128),
        value in prop::collection::vec(any::<u8>(), 0..1024)
    ) {
        let (_dir, mut store) = scratch_store();

        prop_assert!(store.set(&key, &value));
        prop_assert!(store.contains(&key));
        prop_assert_eq!(store.get(&key), Some(value.clone()));

        // Repeated lookups agree
        prop_assert_eq!(store.get(&key), Some(value));
        prop_assert!(store.contains(&key));
    }

    #[test]
    fn prop_erase_absent_is_noop(
        keys in prop::collection::hash_set(prop::collection::vec(any::<u8>(), 1..16), 1..20),
        absent in prop::collection::vec(any::<u8>(), 17..24)
    ) {
        let (_dir, mut store) = scratch_store();
        for key in &keys {
            store.set(key, b"v");
        }
        let before = store.num_values();

        prop_assert!(!store.erase(&absent));
        prop_assert_eq!(store.num_values(), before);
        prop_assert_eq!(before, keys.len());
    }

    #[test]
    fn prop_matches_model(ops in prop::collection::vec(op(), 1..60)) {
        let (_dir, mut store) = scratch_store();
        let mut model: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();

        for op in ops {
            match op {
                Op::Set(key, value) => {
                    prop_assert!(store.set(&key, &value));
                    model.insert(key, value);
                }
                Op::Erase(key) => {
                    prop_assert_eq!(store.erase(&key), model.remove(&key).is_some());
                }
                Op::Rename(old, new) => {
                    let expected = model.contains_key(&old) && !model.contains_key(&new);
                    prop_assert_eq!(store.rename(&old, &new), expected);
                    if expected {
                        let value = model.remove(&old).unwrap();
                        model.insert(new, value);
                    }
                }
            }
            prop_assert_eq!(store.num_values(), model.len());
        }

        prop_assert_eq!(store.to_map(), model);
    }

    #[test]
    fn prop_tables_are_isolated(
        left in prop::collection::hash_map(prop::collection::vec(any::<u8>(), 0..8), any::<u8>(), 0..20),
        right in prop::collection::hash_map(prop::collection::vec(any::<u8>(), 0..8), any::<u8>(), 0..20)
    ) {
        let (_dir, mut store) = scratch_store();

        for (key, value) in &left {
            store.set(key, [*value]);
        }
        prop_assert!(store.create_table("right"));
        for (key, value) in &right {
            store.set(key, [*value]);
        }

        prop_assert_eq!(store.num_values(), right.len());
        for (key, value) in &right {
            prop_assert_eq!(store.get(key), Some(vec![*value]));
        }

        prop_assert!(store.set_table("main"));
        prop_assert_eq!(store.num_values(), left.len());
        for (key, value) in &left {
            prop_assert_eq!(store.get(key), Some(vec![*value]));
        }
    }
}
