use std::collections::BTreeMap;

use proptest::{
    collection::{btree_map, hash_set, vec},
    prelude::*,
    sample::SizeRange,
    strategy::ValueTree,
    test_runner::{Config as TestConfig, TestRunner},
};

/// A key small enough that any tree accepts it.
pub fn key() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), 1..24)
}

pub fn value() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), 0..48)
}

/// Distinct keys, in arbitrary order.
pub fn keys(size: impl Into<SizeRange>) -> impl Strategy<Value = Vec<Vec<u8>>> {
    hash_set(key(), size).prop_map(|keys| keys.into_iter().collect())
}

/// Entries with distinct keys, in arbitrary order.
pub fn entries(size: impl Into<SizeRange>) -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    keys(size).prop_flat_map(|keys| {
        let len = keys.len();
        (Just(keys), vec(value(), len))
            .prop_map(|(keys, values)| keys.into_iter().zip(values).collect())
    })
}

/// Entries with distinct keys, sorted by key.
pub fn sorted_entries(
    size: impl Into<SizeRange>,
) -> impl Strategy<Value = BTreeMap<Vec<u8>, Vec<u8>>> {
    btree_map(key(), value(), size)
}

pub fn unwrap_strategy<T: std::fmt::Debug>(strategy: impl Strategy<Value = T>) -> T {
    let mut test_runner = TestRunner::new(TestConfig::default());

    strategy
        .new_tree(&mut test_runner)
        .expect("Failed to get new value from strategy")
        .current()
}
