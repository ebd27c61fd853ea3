#![cfg(any(feature = "blake3", feature = "blake2", feature = "sha2"))]

use std::{collections::BTreeMap, num::NonZeroU32};

use crate::{prelude::*, testing::*};

fn depth_modulo(modulus: u32) -> DepthModuloCache {
    DepthModuloCache::new(NonZeroU32::new(modulus).unwrap())
}

/// Small enough that nodes relocate after a handful of edits, large enough
/// for any entry the strategies generate.
const TIGHT_RECORD_SIZE: usize = 256;

macro_rules! generate_tree_tests {
    ($digest:ident, $policy_name:ident, $policy:expr) => {
        paste::paste! {
            #[allow(non_snake_case)]
            mod [<$digest _ $policy_name _tests>] {
                use super::*;
                use proptest::prelude::*;

                type TestTree = Tree<$digest, MemoryStore>;

                fn tree() -> TestTree {
                    Tree::new(MemoryStore::default(), $policy)
                }

                fn tight_tree() -> TestTree {
                    Tree::new(MemoryStore::with_max_record_size(TIGHT_RECORD_SIZE), $policy)
                }

                fn filled(mut tree: TestTree, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<TestTree> {
                    for (key, value) in entries {
                        tree.insert(key, value)?;
                    }
                    Ok(tree)
                }

                #[test_strategy::proptest(fork = false)]
                fn test_inserted_entries_are_readable(
                    #[strategy(entries(1..64))] entries: Vec<(Vec<u8>, Vec<u8>)>,
                ) {
                    let mut tree = filled(tree(), &entries)?;
                    prop_assert_eq!(tree.check(None)?, entries.len());

                    for (key, value) in &entries {
                        let stored = tree.get(key)?;
                        prop_assert_eq!(stored.as_ref(), Some(value));
                    }

                    tree.close_snapshot()?;
                    prop_assert_eq!(tree.check(Some(1))?, entries.len());
                    for (key, value) in &entries {
                        let stored = tree.get_at(1, key)?;
                        prop_assert_eq!(stored.as_ref(), Some(value));
                    }

                    let sorted: BTreeMap<_, _> = entries.into_iter().collect();
                    prop_assert_eq!(tree.entries()?, sorted.into_iter().collect::<Vec<_>>());
                }

                #[test_strategy::proptest(fork = false)]
                fn test_missing_keys_read_as_none(
                    #[strategy(entries(0..32))] entries: Vec<(Vec<u8>, Vec<u8>)>,
                    #[strategy(key())] missing: Vec<u8>,
                ) {
                    prop_assume!(entries.iter().all(|(key, _)| *key != missing));

                    let mut tree = filled(tree(), &entries)?;
                    prop_assert_eq!(tree.get(&missing)?, None);
                    tree.close_snapshot()?;
                    prop_assert_eq!(tree.get_at(1, &missing)?, None);
                }

                #[test_strategy::proptest(fork = false)]
                fn test_closed_snapshots_never_change(
                    #[strategy(sorted_entries(1..32))] first: BTreeMap<Vec<u8>, Vec<u8>>,
                    #[strategy(sorted_entries(1..32))] second: BTreeMap<Vec<u8>, Vec<u8>>,
                ) {
                    let mut tree = tree();
                    for (key, value) in &first {
                        tree.insert(key, value)?;
                    }
                    let authenticator = tree.close_snapshot()?;
                    let before = tree.entries_at(1)?;

                    let mut expected = first.clone();
                    for (key, value) in &second {
                        if first.contains_key(key) {
                            let previous = tree.update(key, value)?;
                            prop_assert_eq!(previous.as_ref(), first.get(key));
                        } else {
                            tree.insert(key, value)?;
                        }
                        expected.insert(key.clone(), value.clone());
                    }
                    tree.close_snapshot()?;

                    prop_assert_eq!(tree.entries_at(1)?, before);
                    prop_assert_eq!(tree.root_authenticator(1)?, authenticator);
                    prop_assert_eq!(tree.entries_at(2)?, expected.into_iter().collect::<Vec<_>>());
                    prop_assert_eq!(tree.check(Some(1))?, first.len());
                }

                #[test_strategy::proptest(fork = false)]
                fn test_shape_ignores_insertion_order(
                    #[strategy(entries(1..48))] entries: Vec<(Vec<u8>, Vec<u8>)>,
                ) {
                    let reversed: Vec<_> = entries.iter().rev().cloned().collect();

                    let mut forward = filled(tree(), &entries)?;
                    let mut backward = filled(tight_tree(), &reversed)?;
                    let always = Tree::<$digest, _>::new(MemoryStore::default(), AlwaysCache);
                    let mut always = filled(always, &reversed)?;
                    let sparse = Tree::<$digest, _>::new(MemoryStore::default(), depth_modulo(3));
                    let mut sparse = filled(sparse, &entries)?;

                    let expected = forward.close_snapshot()?;
                    prop_assert_eq!(backward.close_snapshot()?, expected);
                    prop_assert_eq!(always.close_snapshot()?, expected);
                    prop_assert_eq!(sparse.close_snapshot()?, expected);
                    prop_assert_eq!(forward.root_authenticator(1)?, expected);
                    prop_assert_eq!(backward.root_authenticator(1)?, expected);
                }

                #[test_strategy::proptest(fork = false)]
                fn test_proofs_validate_against_the_root(
                    #[strategy(entries(1..48))] entries: Vec<(Vec<u8>, Vec<u8>)>,
                    #[strategy(key())] other: Vec<u8>,
                ) {
                    let mut tree = filled(tree(), &entries)?;
                    let root = tree.close_snapshot()?;

                    for (key, value) in &entries {
                        let proof = tree.is_member(1, key)?;
                        prop_assert!(proof.found());
                        prop_assert!(proof.validate(key, &root));
                        let proven = proof.payload()?.map(|payload| payload.value);
                        prop_assert_eq!(proven.as_ref(), Some(value));

                        let mut forged = root.to_bytes();
                        forged[0] ^= 1;
                        prop_assert!(!proof.validate(key, &Hash::new(forged)));
                    }

                    let proof = tree.is_member(1, &other)?;
                    let present = entries.iter().any(|(key, _)| *key == other);
                    prop_assert_eq!(proof.found(), present);
                    prop_assert!(proof.validate(&other, &root));
                }

                #[test_strategy::proptest(fork = false)]
                fn test_proofs_of_old_snapshots_survive_later_edits(
                    #[strategy(entries(2..32))] entries: Vec<(Vec<u8>, Vec<u8>)>,
                ) {
                    let (head, tail) = entries.split_at(entries.len() / 2);
                    let mut tree = filled(tree(), head)?;
                    let root = tree.close_snapshot()?;

                    for (key, value) in tail {
                        tree.insert(key, value)?;
                    }
                    for (key, _) in head {
                        tree.update(key, b"rewritten")?;
                    }
                    let next = tree.close_snapshot()?;

                    for (key, _) in head {
                        prop_assert!(tree.is_member(1, key)?.validate(key, &root));
                        prop_assert!(tree.is_member(2, key)?.validate(key, &next));
                    }
                    for (key, _) in tail {
                        let proof = tree.is_member(1, key)?;
                        prop_assert!(!proof.found());
                        prop_assert!(proof.validate(key, &root));
                    }
                }

                #[test_strategy::proptest(fork = false)]
                fn test_relocation_preserves_history(
                    #[strategy(entries(1..24))] entries: Vec<(Vec<u8>, Vec<u8>)>,
                ) {
                    let mut tight = filled(tight_tree(), &entries)?;
                    let mut roomy = filled(tree(), &entries)?;

                    let mut roots = vec![tight.close_snapshot()?];
                    prop_assert_eq!(roomy.close_snapshot()?, roots[0]);

                    for round in 0..6u8 {
                        for (key, _) in &entries {
                            let value = vec![round; 40];
                            tight.update(key, &value)?;
                            roomy.update(key, &value)?;
                        }
                        let root = tight.close_snapshot()?;
                        prop_assert_eq!(roomy.close_snapshot()?, root);
                        roots.push(root);
                    }

                    prop_assert!(tight.relocations() > 0);
                    prop_assert!(tight.store().largest_record() <= TIGHT_RECORD_SIZE);

                    for (key, value) in &entries {
                        let stored = tight.get_at(1, key)?;
                        prop_assert_eq!(stored.as_ref(), Some(value));
                        for round in 0..6u8 {
                            let snapshot = SnapshotId::from(round) + 2;
                            prop_assert_eq!(tight.get_at(snapshot, key)?, Some(vec![round; 40]));
                        }
                    }

                    for (index, root) in roots.iter().enumerate() {
                        let snapshot = index as SnapshotId + 1;
                        prop_assert_eq!(tight.root_authenticator(snapshot)?, *root);
                        prop_assert_eq!(tight.check(Some(snapshot))?, entries.len());
                        for (key, _) in &entries {
                            prop_assert!(tight.is_member(snapshot, key)?.validate(key, root));
                        }
                    }
                }

                #[test_strategy::proptest(fork = false)]
                fn test_changes_replicate_snapshots(
                    #[strategy(entries(1..32))] entries: Vec<(Vec<u8>, Vec<u8>)>,
                ) {
                    let mut source = tree();
                    let (head, tail) = entries.split_at(entries.len() / 2);

                    for (key, value) in head {
                        source.insert(key, value)?;
                    }
                    source.close_snapshot()?;

                    for (key, value) in tail {
                        source.insert(key, value)?;
                    }
                    for (key, _) in head.iter().step_by(2) {
                        source.update(key, b"updated")?;
                    }
                    source.close_snapshot()?;

                    let mut replica = tight_tree();
                    for snapshot in 1..=2 {
                        let changes = source.changes(snapshot)?;
                        replica.apply(&changes)?;
                        prop_assert_eq!(
                            replica.close_snapshot()?,
                            source.root_authenticator(snapshot)?
                        );
                    }

                    let second = source.changes(2)?;
                    let updates = second
                        .iter()
                        .filter(|change| matches!(change, Change::Update { .. }))
                        .count();
                    prop_assert_eq!(updates, head.iter().step_by(2).count());
                    prop_assert_eq!(second.len(), tail.len() + updates);
                }

                #[test_strategy::proptest(fork = false)]
                fn test_duplicate_insert_is_rejected(
                    #[strategy(entries(1..16))] entries: Vec<(Vec<u8>, Vec<u8>)>,
                ) {
                    let mut tree = filled(tree(), &entries)?;
                    let before = tree.entries()?;

                    let (key, _) = &entries[0];
                    prop_assert!(matches!(tree.insert(key, b"other"), Err(Error::KeyExists)));
                    prop_assert_eq!(tree.entries()?, before);
                    prop_assert_eq!(tree.check(None)?, entries.len());
                }

                #[test]
                fn test_update_returns_the_previous_value() {
                    let mut tree = tree();
                    assert_eq!(tree.update(b"absent", b"value").unwrap(), None);
                    assert_eq!(tree.get(b"absent").unwrap(), None);

                    tree.insert(b"key", b"first").unwrap();
                    assert_eq!(tree.update(b"key", b"second").unwrap(), Some(b"first".to_vec()));
                    assert_eq!(tree.update(b"key", b"third").unwrap(), Some(b"second".to_vec()));
                    assert_eq!(tree.get(b"key").unwrap(), Some(b"third".to_vec()));
                }

                #[test]
                fn test_apply_rejects_updates_of_absent_keys() {
                    let mut tree = tree();
                    let changes = [
                        Change::Insert { key: b"a".to_vec(), value: b"1".to_vec() },
                        Change::Update { key: b"b".to_vec(), value: b"2".to_vec() },
                    ];

                    assert!(matches!(tree.apply(&changes), Err(Error::KeyNotFound)));
                    assert_eq!(tree.get(b"a").unwrap(), Some(b"1".to_vec()));
                }

                #[test]
                fn test_empty_tree() {
                    let mut tree = tree();
                    assert_eq!(tree.last_closed_snapshot(), None);
                    assert!(tree.entries().unwrap().is_empty());

                    let root = tree.close_snapshot().unwrap();
                    assert!(root.is_zero());
                    assert_eq!(tree.last_closed_snapshot(), Some(1));
                    assert_eq!(tree.current_snapshot(), 2);

                    let proof = tree.is_member(1, b"key").unwrap();
                    assert!(proof.is_empty());
                    assert!(!proof.found());
                    assert!(proof.validate(b"key", &root));
                    assert!(tree.changes(1).unwrap().is_empty());
                }

                #[test]
                fn test_open_snapshots_are_unknown() {
                    let mut tree = tree();
                    tree.insert(b"key", b"value").unwrap();

                    assert!(matches!(tree.get_at(0, b"key"), Err(Error::UnknownSnapshot(0))));
                    assert!(matches!(tree.get_at(1, b"key"), Err(Error::UnknownSnapshot(1))));
                    assert!(matches!(tree.is_member(1, b"key"), Err(Error::UnknownSnapshot(1))));
                    assert!(matches!(tree.root_authenticator(1), Err(Error::UnknownSnapshot(1))));
                    assert!(matches!(tree.changes(1), Err(Error::UnknownSnapshot(1))));

                    tree.close_snapshot().unwrap();
                    assert_eq!(tree.get_at(1, b"key").unwrap(), Some(b"value".to_vec()));
                    assert!(matches!(tree.entries_at(2), Err(Error::UnknownSnapshot(2))));
                }

                #[test]
                fn test_oversized_entries_are_rejected() {
                    let store = MemoryStore::with_max_record_size(160);
                    let mut tree = Tree::<$digest, _>::new(store, $policy);

                    assert!(matches!(
                        tree.insert(b"key", &[0; 100]),
                        Err(Error::RecordTooLarge { max: 160, .. })
                    ));
                    assert!(matches!(
                        tree.insert(&vec![0; 70_000], b"value"),
                        Err(Error::KeyTooLarge { len: 70_000 })
                    ));
                    assert!(tree.store().is_empty());

                    tree.insert(b"key", b"value").unwrap();
                    assert!(matches!(
                        tree.update(b"key", &[0; 100]),
                        Err(Error::RecordTooLarge { .. })
                    ));
                    assert_eq!(tree.get(b"key").unwrap(), Some(b"value".to_vec()));
                }

                #[test]
                fn test_rewrites_within_a_snapshot_keep_one_version() {
                    let mut tree = tight_tree();
                    tree.insert(b"key", b"first").unwrap();
                    for round in 0..32u8 {
                        tree.update(b"key", &[round; 40]).unwrap();
                    }
                    tree.close_snapshot().unwrap();

                    assert_eq!(tree.relocations(), 0);
                    assert_eq!(tree.get_at(1, b"key").unwrap(), Some(vec![31; 40]));
                    assert_eq!(
                        tree.changes(1).unwrap(),
                        vec![Change::Insert { key: b"key".to_vec(), value: vec![31; 40] }]
                    );
                }
            }
        }
    };
}

/// Writes per snapshot, each naming a key of a fixed pool by index.
type Rounds = Vec<Vec<(proptest::sample::Index, Vec<u8>)>>;

macro_rules! generate_cross_policy_tests {
    ($digest:ident) => {
        paste::paste! {
            #[allow(non_snake_case)]
            mod [<$digest _cross_policy_tests>] {
                use super::*;
                use proptest::{collection::vec, prelude::*};

                /// A roomy always-cache tree first, then depth-modulo trees tight
                /// enough to relocate.
                fn trees() -> Vec<Tree<$digest, MemoryStore>> {
                    let tight = || MemoryStore::with_max_record_size(TIGHT_RECORD_SIZE);
                    vec![
                        Tree::new(MemoryStore::default(), AlwaysCache),
                        Tree::new(tight(), depth_modulo(1)),
                        Tree::new(tight(), depth_modulo(2)),
                        Tree::new(tight(), depth_modulo(3)),
                    ]
                }

                #[test_strategy::proptest(fork = false)]
                fn test_policies_agree_on_every_snapshot(
                    #[strategy(keys(1..16))] keys: Vec<Vec<u8>>,
                    #[strategy(vec(vec((any::<prop::sample::Index>(), value()), 0..24), 1..8))]
                    rounds: Rounds,
                ) {
                    let mut trees = trees();
                    let mut model = BTreeMap::new();
                    let mut sealed = Vec::new();

                    for writes in &rounds {
                        for (index, value) in writes {
                            let key = index.get(&keys);
                            let present = model.contains_key(key);
                            for tree in trees.iter_mut() {
                                if present {
                                    prop_assert!(tree.update(key, value)?.is_some());
                                } else {
                                    tree.insert(key, value)?;
                                }
                                let stored = tree.get(key)?;
                                prop_assert_eq!(stored.as_ref(), Some(value));
                            }
                            model.insert(key.clone(), value.clone());
                        }

                        let mut roots = Vec::new();
                        for tree in trees.iter_mut() {
                            roots.push(tree.close_snapshot()?);
                        }
                        prop_assert!(roots.windows(2).all(|pair| pair[0] == pair[1]));
                        sealed.push((roots[0], model.clone()));
                    }

                    for (index, (root, entries)) in sealed.iter().enumerate() {
                        let snapshot = index as SnapshotId + 1;
                        let expected: Vec<_> = entries.clone().into_iter().collect();

                        for tree in &trees {
                            prop_assert_eq!(tree.root_authenticator(snapshot)?, *root);
                            prop_assert_eq!(tree.entries_at(snapshot)?, expected.clone());
                            prop_assert_eq!(tree.check(Some(snapshot))?, entries.len());

                            for key in &keys {
                                let proof = tree.is_member(snapshot, key)?;
                                prop_assert_eq!(proof.found(), entries.contains_key(key));
                                prop_assert!(proof.validate(key, root));
                            }
                        }
                    }
                }
            }
        }
    };
}

#[cfg(feature = "blake3")]
type Blake3 = blake3::Hasher;
#[cfg(feature = "blake2")]
type Blake2s = blake2::Blake2s256;
#[cfg(feature = "sha2")]
type Sha256 = sha2::Sha256;

#[cfg(feature = "blake3")]
generate_tree_tests!(Blake3, Always, AlwaysCache);
#[cfg(feature = "blake3")]
generate_tree_tests!(Blake3, DepthModulo1, depth_modulo(1));
#[cfg(feature = "blake3")]
generate_tree_tests!(Blake3, DepthModulo3, depth_modulo(3));

#[cfg(feature = "blake2")]
generate_tree_tests!(Blake2s, Always, AlwaysCache);
#[cfg(feature = "blake2")]
generate_tree_tests!(Blake2s, DepthModulo2, depth_modulo(2));

#[cfg(feature = "sha2")]
generate_tree_tests!(Sha256, Always, AlwaysCache);
#[cfg(feature = "sha2")]
generate_tree_tests!(Sha256, DepthModulo2, depth_modulo(2));

#[cfg(feature = "blake3")]
generate_cross_policy_tests!(Blake3);
#[cfg(feature = "blake2")]
generate_cross_policy_tests!(Blake2s);
#[cfg(feature = "sha2")]
generate_cross_policy_tests!(Sha256);
