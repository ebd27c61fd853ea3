mod error;

pub mod auth;
pub mod hash;
pub mod node;
pub mod path;
pub mod prelude;
pub mod proof;
pub mod record;
pub mod store;
pub mod testing;
pub mod tree;

#[doc(hidden)]
/// This is a hidden module to make the macros defined on this crate available for the users.
pub mod __dependencies {
    pub use paste;
    pub use proptest;
    pub use test_strategy;
}

/// Generates a conformance suite for a [`NodeStore`](crate::store::NodeStore)
/// implementation. `$store` must build a fresh, empty store whose ceiling
/// admits records of at least 256 bytes.
#[macro_export]
macro_rules! test_node_store {
    ($name:ident, $store:expr) => {
        $crate::__dependencies::paste::paste! {
            mod [<test_node_store_ $name:snake>] {
                use $crate::__dependencies::{
                    proptest::{collection::vec, prelude::*},
                    test_strategy,
                };
                use $crate::prelude::*;

                use super::*;

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test]
                fn test_starts_empty() {
                    let store = $store;
                    assert_eq!(store.current_snapshot(), 1);
                    assert!(store.root().is_nil());
                    assert!(matches!(store.root_at(1), Err(StorageError::UnknownSnapshot(1))));
                    assert!(matches!(
                        store.authenticator_at(0),
                        Err(StorageError::UnknownSnapshot(0))
                    ));
                }

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test]
                fn test_allocates_distinct_ids() {
                    let mut store = $store;
                    let mut ids = std::collections::BTreeSet::new();
                    for _ in 0..64 {
                        let id = store.allocate_id().unwrap();
                        assert!(!id.is_nil());
                        assert!(ids.insert(id));
                    }
                }

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test]
                fn test_missing_record_is_not_found() {
                    let mut store = $store;
                    let id = store.allocate_id().unwrap();
                    assert!(matches!(
                        store.read(id),
                        Err(StorageError::NotFound(missing)) if missing == id
                    ));
                }

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test_strategy::proptest(fork = false)]
                fn test_reads_return_the_last_write(
                    #[strategy(vec(any::<u8>(), 0..128))] first: Vec<u8>,
                    #[strategy(vec(any::<u8>(), 0..128))] second: Vec<u8>,
                ) {
                    let mut store = $store;
                    let id = store.allocate_id()?;

                    store.write(id, &first)?;
                    prop_assert_eq!(store.read(id)?, first);
                    store.write(id, &second)?;
                    prop_assert_eq!(store.read(id)?, second);
                }

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test_strategy::proptest(fork = false)]
                fn test_closing_seals_root_and_authenticator(
                    #[strategy(vec(any::<Hash>(), 1..8))] authenticators: Vec<Hash>,
                ) {
                    let mut store = $store;
                    let mut roots = Vec::new();

                    for authenticator in &authenticators {
                        let root = store.allocate_id()?;
                        store.set_root(root)?;
                        let closed = store.close_snapshot(root, *authenticator)?;
                        prop_assert_eq!(closed + 1, store.current_snapshot());
                        roots.push(root);
                    }

                    let sealed = roots.iter().zip(&authenticators);
                    for (index, (root, authenticator)) in sealed.enumerate() {
                        let snapshot = index as SnapshotId + 1;
                        prop_assert_eq!(store.root_at(snapshot)?, *root);
                        prop_assert_eq!(store.authenticator_at(snapshot)?, *authenticator);
                    }
                    prop_assert_eq!(store.root(), *roots.last().unwrap());
                    prop_assert!(store.root_at(store.current_snapshot()).is_err());
                }
            }
        }
    };
}
