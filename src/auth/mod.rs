//! Authenticators and the strategies that cache them inside nodes.
//!
//! The authenticator of a node is `H(left ‖ key ‖ H(payload) ‖ right)`, where
//! `left` and `right` are the authenticators of its subtrees and the empty
//! subtree authenticates to [`Hash::zero`]. The root's authenticator commits
//! to every key and payload reachable in a snapshot.
//!
//! Caching is a trade between record space and recomputation. A policy only
//! ever looks at the authenticator history of a single node, so it carries no
//! state of its own and the tree holds exactly one for its whole lifetime.

mod always;
mod depth;

use std::fmt::Debug;

use digest::Digest;

pub use always::AlwaysCache;
pub use depth::DepthModuloCache;

use crate::{
    error::Result,
    hash::Hash,
    node::{Node, SnapshotId},
};

pub fn authenticator<D: Digest>(left: &Hash, key: &[u8], payload: &[u8], right: &Hash) -> Hash {
    let payload = Hash::digest::<D>(payload);

    let mut hasher = D::new();
    hasher.update(left);
    hasher.update(key);
    hasher.update(payload);
    hasher.update(right);
    Hash::from_digest(&hasher.finalize())
}

pub trait AuthenticatorCache: Debug + Send + Sync {
    /// Fixed size in bytes of one entry in a node's authenticator history.
    fn entry_size(&self) -> usize;

    /// Whether the authenticator computed when closing `snapshot` should be
    /// kept in a node found at `depth`.
    fn should_store(&self, snapshot: SnapshotId, depth: usize) -> bool;

    /// Encodes the entry recording `authenticator` as computed in `snapshot`.
    fn entry(&self, snapshot: SnapshotId, authenticator: &Hash) -> Vec<u8>;

    /// The cached authenticator describing `node` as of `snapshot`, if any.
    ///
    /// For the open snapshot this answers for nodes that are not modified.
    /// `None` means the caller has to recompute it from the children.
    fn lookup(&self, node: &Node, snapshot: SnapshotId) -> Result<Option<Hash>>;

    /// Called on a modified node while `snapshot` closes, before its new
    /// authenticator is (maybe) stored. Edits never grow the record.
    fn retire(&self, node: &mut Node, snapshot: SnapshotId) -> Result<()>;

    /// Called on a node that is being replaced during `snapshot`, so that
    /// the history left behind only describes earlier snapshots.
    fn cleanup_after(&self, node: &mut Node, snapshot: SnapshotId) -> Result<()>;
}

impl<T: AuthenticatorCache + ?Sized> AuthenticatorCache for Box<T> {
    fn entry_size(&self) -> usize {
        (**self).entry_size()
    }

    fn should_store(&self, snapshot: SnapshotId, depth: usize) -> bool {
        (**self).should_store(snapshot, depth)
    }

    fn entry(&self, snapshot: SnapshotId, authenticator: &Hash) -> Vec<u8> {
        (**self).entry(snapshot, authenticator)
    }

    fn lookup(&self, node: &Node, snapshot: SnapshotId) -> Result<Option<Hash>> {
        (**self).lookup(node, snapshot)
    }

    fn retire(&self, node: &mut Node, snapshot: SnapshotId) -> Result<()> {
        (**self).retire(node, snapshot)
    }

    fn cleanup_after(&self, node: &mut Node, snapshot: SnapshotId) -> Result<()> {
        (**self).cleanup_after(node, snapshot)
    }
}

#[cfg(all(test, any(feature = "blake3", feature = "blake2", feature = "sha2")))]
mod tests {
    use super::*;

    macro_rules! generate_authenticator_tests {
        ($digest:ident) => {
            paste::paste! {
                #[allow(non_snake_case)]
                mod [<$digest _tests>] {
                    use super::*;
                    use proptest::{collection::vec, prelude::*};

                    #[test_strategy::proptest(fork = false)]
                    fn test_children_are_not_interchangeable(
                        left: Hash,
                        right: Hash,
                        #[strategy(vec(any::<u8>(), 0..16))] key: Vec<u8>,
                        #[strategy(vec(any::<u8>(), 0..16))] payload: Vec<u8>,
                    ) {
                        prop_assume!(left != right);

                        prop_assert_ne!(
                            authenticator::<$digest>(&left, &key, &payload, &right),
                            authenticator::<$digest>(&right, &key, &payload, &left)
                        );
                    }

                    #[test]
                    fn test_leaf_commits_to_key_and_payload() {
                        let nil = Hash::zero();
                        let leaf = authenticator::<$digest>(&nil, b"key", b"payload", &nil);

                        assert!(!leaf.is_zero());
                        assert_eq!(leaf, authenticator::<$digest>(&nil, b"key", b"payload", &nil));
                        assert_ne!(leaf, authenticator::<$digest>(&nil, b"key", b"payloaD", &nil));
                        assert_ne!(leaf, authenticator::<$digest>(&nil, b"kex", b"payload", &nil));
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
    generate_authenticator_tests!(Blake3);
    #[cfg(feature = "blake2")]
    generate_authenticator_tests!(Blake2s);
    #[cfg(feature = "sha2")]
    generate_authenticator_tests!(Sha256);
}
