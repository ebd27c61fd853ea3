//! Authenticated multi-version treap.
//!
//! The tree is an ordered map whose shape is a treap: a binary search tree on
//! keys that is also a max-heap on priorities. Priorities are the digest of
//! the key rather than random numbers, so the shape only depends on the key
//! set and two trees holding the same entries authenticate to the same root.
//!
//! Nodes live in a [`NodeStore`] and refer to each other by id. Every pointer
//! and value is versioned by snapshot: edits land in the open snapshot, and
//! closing it freezes the current state, computes its root authenticator and
//! opens the next one. Closed snapshots stay readable forever.
//!
//! When an edit does not fit in a node's record the node is relocated: its
//! open-snapshot entries are stripped, a replacement carrying the node's
//! current state is allocated, and the pointer leading to it is redirected
//! through the [`TreePath`] of the running operation. Redirecting may itself
//! relocate the parent, so copy-on-write climbs only as far as it has to.
//!
//! ## Operations
//!
//! - [`Tree::insert`], [`Tree::update`] edit the open snapshot.
//! - [`Tree::get`], [`Tree::get_at`] read the open or a closed snapshot.
//! - [`Tree::close_snapshot`] seals the open snapshot and returns its root
//!   authenticator; [`Tree::root_authenticator`] derives it again later.
//! - [`Tree::is_member`] produces an [`ExistenceProof`] that validates
//!   against a root authenticator without access to the store.
//! - [`Tree::changes`] and [`Tree::apply`] ship snapshots between trees.
//!
//! [`ExistenceProof`]: crate::proof::ExistenceProof

mod history;
mod mutation;
mod snapshot;

#[cfg(test)]
mod tests;

use std::{borrow::Cow, cmp::Ordering, marker::PhantomData};

use digest::Digest;

pub use history::Change;

use crate::{
    auth::AuthenticatorCache,
    error::{Error, Result},
    hash::Hash,
    node::{Node, NodeId, SnapshotId, Slot, LATEST},
    path::Edge,
    store::{NodeCache, NodeStore},
};

pub struct Tree<D: Digest, S: NodeStore> {
    store: S,
    cache: NodeCache,
    policy: Box<dyn AuthenticatorCache>,
    relocations: u64,
    _phantom: PhantomData<D>,
}

impl<D: Digest, S: NodeStore> Tree<D, S> {
    /// Opens a tree over `store`, caching authenticators according to `policy`.
    ///
    /// The policy decides the layout of the authenticator history inside each
    /// node, so a store must always be reopened with the policy it was
    /// written with.
    pub fn new(store: S, policy: impl AuthenticatorCache + 'static) -> Self {
        Self {
            cache: NodeCache::new(policy.entry_size()),
            policy: Box::new(policy),
            store,
            relocations: 0,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn policy(&self) -> &dyn AuthenticatorCache {
        self.policy.as_ref()
    }

    /// The snapshot edits currently go to.
    pub fn current_snapshot(&self) -> SnapshotId {
        self.store.current_snapshot()
    }

    pub fn last_closed_snapshot(&self) -> Option<SnapshotId> {
        self.current_snapshot().checked_sub(1).filter(|s| *s > 0)
    }

    /// Root node of a closed snapshot.
    pub fn root_at(&self, snapshot: SnapshotId) -> Result<NodeId> {
        self.ensure_closed(snapshot)?;
        Ok(self.store.root_at(snapshot)?)
    }

    /// Number of nodes relocated by this instance so far.
    pub fn relocations(&self) -> u64 {
        self.relocations
    }

    fn ensure_closed(&self, snapshot: SnapshotId) -> Result<()> {
        if snapshot == 0 || snapshot >= self.current_snapshot() {
            return Err(Error::UnknownSnapshot(snapshot));
        }
        Ok(())
    }

    /// Runs a mutating operation between a fresh cache and a write-back of
    /// everything it dirtied. Nothing reaches the store if it fails.
    fn bracket<T>(&mut self, operation: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.cache.begin(&self.store);
        match operation(self) {
            Ok(value) => {
                self.cache.flush(&mut self.store)?;
                Ok(value)
            }
            Err(error) => {
                self.cache.discard();
                Err(error)
            }
        }
    }

    /// The node an edge points at in the open snapshot.
    fn follow(&self, edge: Edge) -> Result<NodeId> {
        match edge {
            Edge::Root => Ok(self.cache.root()),
            Edge::Child { host, slot } => self.cache.node(host)?.child(slot),
        }
    }

    /// Reads a node, preferring the in-flight copy of a running operation.
    fn load(&self, id: NodeId) -> Result<Cow<'_, Node>> {
        match self.cache.get(id) {
            Some(node) => Ok(Cow::Borrowed(node)),
            None => Ok(Cow::Owned(Node::decode(
                id,
                self.store.read(id)?,
                self.policy.entry_size(),
            )?)),
        }
    }

    /// Value of `key` in the open snapshot.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.search(self.store.root(), LATEST, key)
    }

    /// Value of `key` as of a closed snapshot.
    pub fn get_at(&self, snapshot: SnapshotId, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let root = self.root_at(snapshot)?;
        self.search(root, snapshot, key)
    }

    fn search(&self, root: NodeId, snapshot: SnapshotId, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut id = root;
        while !id.is_nil() {
            let node = self.load(id)?;
            id = match key.cmp(node.key()) {
                Ordering::Equal => return Ok(Some(node.value_at(snapshot)?)),
                Ordering::Less => node.child_at(Slot::Left, snapshot)?,
                Ordering::Greater => node.child_at(Slot::Right, snapshot)?,
            };
        }
        Ok(None)
    }

    /// Visits the nodes reachable at `snapshot` in key order.
    fn walk(
        &self,
        id: NodeId,
        snapshot: SnapshotId,
        visit: &mut impl FnMut(&Node) -> Result<()>,
    ) -> Result<()> {
        if id.is_nil() {
            return Ok(());
        }

        let node = self.load(id)?;
        self.walk(node.child_at(Slot::Left, snapshot)?, snapshot, visit)?;
        visit(&*node)?;
        self.walk(node.child_at(Slot::Right, snapshot)?, snapshot, visit)
    }

    fn collect(&self, root: NodeId, snapshot: SnapshotId) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        self.walk(root, snapshot, &mut |node: &Node| {
            entries.push((node.key().to_vec(), node.value_at(snapshot)?));
            Ok(())
        })?;
        Ok(entries)
    }

    /// Every entry of the open snapshot in key order.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.collect(self.store.root(), LATEST)
    }

    pub fn entries_at(&self, snapshot: SnapshotId) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let root = self.root_at(snapshot)?;
        self.collect(root, snapshot)
    }

    /// Verifies search order and heap order of a snapshot, `None` meaning the
    /// open one, and returns the number of nodes in it.
    pub fn check(&self, snapshot: Option<SnapshotId>) -> Result<usize> {
        let (root, snapshot) = match snapshot {
            Some(snapshot) => (self.root_at(snapshot)?, snapshot),
            None => (self.store.root(), LATEST),
        };
        self.check_subtree(root, snapshot, None, None, None)
    }

    fn check_subtree(
        &self,
        id: NodeId,
        snapshot: SnapshotId,
        low: Option<&[u8]>,
        high: Option<&[u8]>,
        parent: Option<&Hash>,
    ) -> Result<usize> {
        if id.is_nil() {
            return Ok(0);
        }

        let node = self.load(id)?;
        let key = node.key();
        if low.is_some_and(|low| key <= low) || high.is_some_and(|high| key >= high) {
            return Err(Error::Corrupted(format!(
                "key {} of node {} is out of order",
                hex::encode(key),
                id
            )));
        }
        if parent.is_some_and(|parent| node.priority() > parent) {
            return Err(Error::Corrupted(format!(
                "node {} outranks its parent",
                id
            )));
        }

        let left = node.child_at(Slot::Left, snapshot)?;
        let right = node.child_at(Slot::Right, snapshot)?;
        Ok(1 + self.check_subtree(left, snapshot, low, Some(key), Some(node.priority()))?
            + self.check_subtree(right, snapshot, Some(key), high, Some(node.priority()))?)
    }
}

impl<D: Digest, S: NodeStore + std::fmt::Debug> std::fmt::Debug for Tree<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("store", &self.store)
            .field("policy", &self.policy)
            .field("relocations", &self.relocations)
            .finish()
    }
}
