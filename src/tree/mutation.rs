use std::cmp::Ordering;

use digest::Digest;
use tracing::debug;

use super::Tree;
use crate::{
    error::{Error, Result},
    hash::Hash,
    node::{fresh_size, Edit, Node, NodeId, Slot, VersionedValue},
    path::{Edge, TreePath},
    store::NodeStore,
};

/// Where an edited node ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Placement {
    InPlace,
    Relocated(NodeId),
}

impl Placement {
    pub(super) fn resolve(self, id: NodeId) -> NodeId {
        match self {
            Placement::InPlace => id,
            Placement::Relocated(new) => new,
        }
    }
}

impl<D: Digest, S: NodeStore> Tree<D, S> {
    /// Adds `key` to the open snapshot.
    ///
    /// # Errors
    /// [`Error::KeyExists`] if the key is already present.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.admit(key, value)?;
        self.bracket(|tree| tree.insert_at(&mut TreePath::new(), key, value))
    }

    /// Replaces the value of `key` in the open snapshot, returning the
    /// previous one. Absent keys are left absent and yield `None`.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.admit(key, value)?;
        let previous = self.bracket(|tree| tree.update_at(&mut TreePath::new(), key, value))?;
        if previous.is_none() {
            debug!(key = %hex::encode(key), "update of absent key ignored");
        }
        Ok(previous)
    }

    /// Rejects entries that would not fit even a freshly allocated node
    /// holding one cached authenticator. Anything smaller is always absorbed
    /// by relocation.
    fn admit(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > u16::MAX as usize {
            return Err(Error::KeyTooLarge { len: key.len() });
        }
        if value.len() > u16::MAX as usize {
            return Err(Error::ValueTooLarge { len: value.len() });
        }

        let required = fresh_size(key.len(), value.len()) + self.policy.entry_size();
        let max = self.store.max_record_size();
        if required > max {
            return Err(Error::RecordTooLarge { required, max });
        }
        Ok(())
    }

    fn insert_at(&mut self, path: &mut TreePath, key: &[u8], value: &[u8]) -> Result<()> {
        let target = self.follow(path.last())?;
        if target.is_nil() {
            let id = self.create_node(key, value)?;
            let depth = path.depth();
            return self.replace_edge(path, depth, id);
        }

        let current = self.cache.fetch(&self.store, target)?;
        let slot = match key.cmp(self.cache.node(current)?.key()) {
            Ordering::Equal => {
                debug!(key = %hex::encode(key), "rejected duplicate key");
                return Err(Error::KeyExists);
            }
            Ordering::Less => Slot::Left,
            Ordering::Greater => Slot::Right,
        };

        path.push(Edge::child(current, slot));
        self.insert_at(path, key, value)?;
        path.pop();

        let current = self.refollow(path, current)?;
        let child = self.cache.node(current)?.child(slot)?;
        let child = self.cache.fetch(&self.store, child)?;

        if self.cache.node(current)?.priority() < self.cache.node(child)?.priority() {
            self.rotate(path, current, child, slot)?;
        } else {
            self.mark_modified(current)?;
        }

        self.cache.release(child);
        self.cache.release(current);
        Ok(())
    }

    fn update_at(
        &mut self,
        path: &mut TreePath,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        let target = self.follow(path.last())?;
        if target.is_nil() {
            return Ok(None);
        }

        let current = self.cache.fetch(&self.store, target)?;
        let slot = match key.cmp(self.cache.node(current)?.key()) {
            Ordering::Equal => {
                let previous = self.cache.node(current)?.value()?;
                self.set_value(path, current, value)?;
                self.cache.release(current);
                return Ok(Some(previous));
            }
            Ordering::Less => Slot::Left,
            Ordering::Greater => Slot::Right,
        };

        path.push(Edge::child(current, slot));
        let previous = self.update_at(path, key, value)?;
        path.pop();

        let current = self.refollow(path, current)?;
        if previous.is_some() {
            self.mark_modified(current)?;
        }
        self.cache.release(current);
        Ok(previous)
    }

    /// Lifts `child`, found under `current`'s `slot`, above `current`.
    ///
    /// `current` adopts the child's inner subtree, the child adopts `current`,
    /// and the incoming edge of `current` is redirected to the child.
    fn rotate(
        &mut self,
        path: &mut TreePath,
        current: NodeId,
        child: NodeId,
        slot: Slot,
    ) -> Result<()> {
        let inner = self.cache.node(child)?.child(slot.opposite())?;
        let current = self.set_child(path, current, slot, inner)?.resolve(current);
        let child = self
            .set_child(path, child, slot.opposite(), current)?
            .resolve(child);
        let depth = path.depth();
        self.replace_edge(path, depth, child)
    }

    pub(super) fn mark_modified(&mut self, id: NodeId) -> Result<()> {
        self.cache.node_mut(id)?.set_modified(true)
    }

    /// Re-reads the id behind the last edge after a nested call that may have
    /// relocated the node, moving our reference over if it did.
    pub(super) fn refollow(&mut self, path: &TreePath, id: NodeId) -> Result<NodeId> {
        let now = self.follow(path.last())?;
        if now != id {
            self.cache.release(id);
            self.cache.fetch(&self.store, now)?;
        }
        Ok(now)
    }

    fn create_node(&mut self, key: &[u8], value: &[u8]) -> Result<NodeId> {
        let id = self.store.allocate_id()?;
        let snapshot = self.store.current_snapshot();
        let node = Node::create(
            id,
            key,
            Hash::digest::<D>(key),
            &VersionedValue::new(snapshot, value),
            NodeId::NIL,
            NodeId::NIL,
            snapshot,
            self.policy.entry_size(),
        )?;
        self.cache.create(node);
        Ok(id)
    }

    /// Points the edge at `index` of `path` to `target`.
    pub(super) fn replace_edge(
        &mut self,
        path: &mut TreePath,
        index: usize,
        target: NodeId,
    ) -> Result<()> {
        match path.get(index) {
            Some(Edge::Root) => {
                self.cache.set_root(target);
                Ok(())
            }
            Some(Edge::Child { host, slot }) => {
                self.set_child(path, host, slot, target).map(|_| ())
            }
            None => Err(Error::Corrupted(format!(
                "path of length {} has no edge {}",
                path.len(),
                index
            ))),
        }
    }

    pub(super) fn set_child(
        &mut self,
        path: &mut TreePath,
        host: NodeId,
        slot: Slot,
        child: NodeId,
    ) -> Result<Placement> {
        let snapshot = self.store.current_snapshot();
        let max = self.store.max_record_size();

        let node = self.cache.node_mut(host)?;
        if node.try_set_child(slot, child, snapshot, max)? == Edit::Applied {
            return Ok(Placement::InPlace);
        }

        let (left, right) = match slot {
            Slot::Left => (child, node.child(Slot::Right)?),
            Slot::Right => (node.child(Slot::Left)?, child),
        };
        let value = node.versioned_value()?;
        self.relocate(path, host, left, right, value).map(Placement::Relocated)
    }

    fn set_value(&mut self, path: &mut TreePath, id: NodeId, value: &[u8]) -> Result<Placement> {
        let snapshot = self.store.current_snapshot();
        let max = self.store.max_record_size();

        let node = self.cache.node_mut(id)?;
        if node.try_set_value(value, snapshot, max)? == Edit::Applied {
            return Ok(Placement::InPlace);
        }

        let (left, right) = (node.child(Slot::Left)?, node.child(Slot::Right)?);
        self.relocate(path, id, left, right, VersionedValue::new(snapshot, value))
            .map(Placement::Relocated)
    }

    /// Replaces `old` with a fresh node holding the given state.
    ///
    /// The old node keeps only what earlier snapshots see. The edge on `path`
    /// hosted by `old` moves to the replacement, and the edge that pointed at
    /// `old` is redirected, which may relocate its host in turn. When no edge
    /// on the path points at `old` the caller must link the returned id.
    pub(super) fn relocate(
        &mut self,
        path: &mut TreePath,
        old: NodeId,
        left: NodeId,
        right: NodeId,
        value: VersionedValue,
    ) -> Result<NodeId> {
        let snapshot = self.store.current_snapshot();

        let node = self.cache.node_mut(old)?;
        node.strip_snapshot(snapshot)?;
        self.policy.cleanup_after(node, snapshot)?;
        node.set_modified(false)?;
        let (key, priority) = (node.key().to_vec(), *node.priority());

        let new = self.store.allocate_id()?;
        let replacement = Node::create(
            new,
            &key,
            priority,
            &value,
            left,
            right,
            snapshot,
            self.policy.entry_size(),
        )?;
        self.cache.create(replacement);
        self.relocations += 1;
        debug!(from = %old, to = %new, snapshot, "relocated node");

        path.rehost(old, new);
        if let Some(index) = self.position_of(path, old)? {
            self.replace_edge(path, index, new)?;
        }
        Ok(new)
    }

    fn position_of(&self, path: &TreePath, target: NodeId) -> Result<Option<usize>> {
        for (index, edge) in path.iter().enumerate() {
            if self.follow(edge)? == target {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}
