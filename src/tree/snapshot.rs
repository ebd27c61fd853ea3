use digest::Digest;
use tracing::{debug, trace};

use super::Tree;
use crate::{
    auth::authenticator,
    error::{Error, Result},
    hash::Hash,
    node::{Edit, NodeId, SnapshotId, Slot, LATEST},
    path::{Edge, TreePath},
    store::NodeStore,
};

impl<D: Digest, S: NodeStore> Tree<D, S> {
    /// Seals the open snapshot and returns its root authenticator.
    ///
    /// Authenticators are recomputed bottom-up for modified nodes only and
    /// handed to the cache policy on the way. The snapshot after it becomes
    /// the open one.
    pub fn close_snapshot(&mut self) -> Result<Hash> {
        let authenticator = self.bracket(|tree| tree.authenticate(&mut TreePath::new()))?;
        let root = self.store.root();
        let snapshot = self.store.close_snapshot(root, authenticator)?;
        debug!(snapshot, root = %root, authenticator = %authenticator, "closed snapshot");
        Ok(authenticator)
    }

    /// Root authenticator of a closed snapshot, derived through the cache policy.
    pub fn root_authenticator(&self, snapshot: SnapshotId) -> Result<Hash> {
        let root = self.root_at(snapshot)?;
        self.authenticator_at(root, snapshot)
    }

    /// Authenticator of the subtree under the last edge of `path` in the open
    /// snapshot.
    fn authenticate(&mut self, path: &mut TreePath) -> Result<Hash> {
        let target = self.follow(path.last())?;
        if target.is_nil() {
            return Ok(Hash::zero());
        }

        let id = self.cache.fetch(&self.store, target)?;
        if !self.cache.node(id)?.is_modified()? {
            let authenticator = self.authenticator_at(id, LATEST)?;
            self.cache.release(id);
            return Ok(authenticator);
        }

        path.push(Edge::child(id, Slot::Left));
        let left = self.authenticate(path)?;
        path.pop();
        let id = self.refollow(path, id)?;

        path.push(Edge::child(id, Slot::Right));
        let right = self.authenticate(path)?;
        path.pop();
        let id = self.refollow(path, id)?;

        let node = self.cache.node(id)?;
        let authenticator =
            authenticator::<D>(&left, node.key(), &node.payload_at(LATEST)?, &right);
        let id = self.record_authenticator(path, id, &authenticator)?;
        self.cache.release(id);
        Ok(authenticator)
    }

    /// Hands a freshly computed authenticator to the policy and clears the
    /// modified flag. Returns the node's id, which changes if storing the
    /// authenticator forced a relocation.
    fn record_authenticator(
        &mut self,
        path: &mut TreePath,
        id: NodeId,
        authenticator: &Hash,
    ) -> Result<NodeId> {
        let snapshot = self.store.current_snapshot();
        let max = self.store.max_record_size();

        let node = self.cache.node_mut(id)?;
        self.policy.retire(node, snapshot)?;

        let mut id = id;
        if self.policy.should_store(snapshot, path.depth()) {
            let entry = self.policy.entry(snapshot, authenticator);
            if node.try_push_authenticator(&entry, max)? == Edit::Overflow {
                let (left, right) = (node.child(Slot::Left)?, node.child(Slot::Right)?);
                let value = node.versioned_value()?;
                let relocated = self.relocate(path, id, left, right, value)?;

                let node = self.cache.node_mut(relocated)?;
                if node.try_push_authenticator(&entry, max)? == Edit::Overflow {
                    return Err(Error::RecordTooLarge {
                        required: node.size() + entry.len(),
                        max,
                    });
                }

                self.cache.fetch(&self.store, relocated)?;
                self.cache.release(id);
                id = relocated;
            }
        }

        self.cache.node_mut(id)?.set_modified(false)?;
        Ok(id)
    }

    /// Authenticator of the subtree rooted at `id` as of `snapshot`, taken
    /// from the cache policy where possible and recomputed from the children
    /// where not.
    pub(super) fn authenticator_at(&self, id: NodeId, snapshot: SnapshotId) -> Result<Hash> {
        if id.is_nil() {
            return Ok(Hash::zero());
        }

        let node = self.load(id)?;
        if let Some(authenticator) = self.policy.lookup(&node, snapshot)? {
            return Ok(authenticator);
        }

        trace!(node = %id, snapshot, "recomputing authenticator");
        let left = self.authenticator_at(node.child_at(Slot::Left, snapshot)?, snapshot)?;
        let right = self.authenticator_at(node.child_at(Slot::Right, snapshot)?, snapshot)?;
        Ok(authenticator::<D>(
            &left,
            node.key(),
            &node.payload_at(snapshot)?,
            &right,
        ))
    }
}
