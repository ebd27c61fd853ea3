use std::collections::BTreeMap;

use super::{NodeStore, StorageError};
use crate::{
    error::{Error, Result},
    node::{Node, NodeId},
};

#[derive(Debug)]
struct Loaded {
    node: Node,
    refs: usize,
    dirty: bool,
}

/// Decoded nodes checked out of a [`NodeStore`] for the duration of one
/// operation.
///
/// Fetching a node that is already loaded only bumps its reference count, so
/// recursive descents can re-enter a node without decoding it twice. Clean
/// nodes are dropped once their count reaches zero; dirty ones, and the root
/// pointer, stay until [`NodeCache::flush`] writes them back at the end of the
/// operation. [`NodeCache::discard`] throws everything away instead, so a
/// failed operation leaves the store untouched.
#[derive(Debug)]
pub struct NodeCache {
    loaded: BTreeMap<NodeId, Loaded>,
    root: NodeId,
    auth_entry_size: usize,
}

impl NodeCache {
    pub fn new(auth_entry_size: usize) -> Self {
        Self {
            loaded: BTreeMap::new(),
            root: NodeId::NIL,
            auth_entry_size,
        }
    }

    /// Starts an operation on top of the store's current root.
    pub fn begin<S: NodeStore>(&mut self, store: &S) {
        self.loaded.clear();
        self.root = store.root();
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    /// Loads `id` if needed and takes a reference to it.
    pub fn fetch<S: NodeStore>(&mut self, store: &S, id: NodeId) -> Result<NodeId> {
        if let Some(loaded) = self.loaded.get_mut(&id) {
            loaded.refs += 1;
            return Ok(id);
        }

        let node = Node::decode(id, store.read(id)?, self.auth_entry_size)?;
        self.loaded.insert(
            id,
            Loaded {
                node,
                refs: 1,
                dirty: false,
            },
        );
        Ok(id)
    }

    /// Adds a node that only exists in memory so far. It holds no reference
    /// and stays loaded until the operation ends.
    pub fn create(&mut self, node: Node) {
        self.loaded.insert(
            node.id(),
            Loaded {
                node,
                refs: 0,
                dirty: true,
            },
        );
    }

    pub fn release(&mut self, id: NodeId) {
        if let Some(loaded) = self.loaded.get_mut(&id) {
            loaded.refs = loaded.refs.saturating_sub(1);
            if loaded.refs == 0 && !loaded.dirty {
                self.loaded.remove(&id);
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.loaded.get(&id).map(|loaded| &loaded.node)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.get(id).ok_or(Error::NotLoaded(id))
    }

    /// Mutable access to a loaded node, which marks it dirty.
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        let loaded = self.loaded.get_mut(&id).ok_or(Error::NotLoaded(id))?;
        loaded.dirty = true;
        Ok(&mut loaded.node)
    }

    pub fn is_loaded(&self, id: NodeId) -> bool {
        self.loaded.contains_key(&id)
    }

    /// Writes every dirty node and the root pointer back to `store`.
    ///
    /// Records are checked against the store's ceiling before the first write,
    /// so an oversized record leaves the store untouched. A backend that fails
    /// halfway through can still keep the records written before the failure.
    /// Those only carry entries of the open snapshot, and the root pointer
    /// moves after the last record is written.
    pub fn flush<S: NodeStore>(&mut self, store: &mut S) -> Result<()> {
        let loaded = std::mem::take(&mut self.loaded);

        let max = store.max_record_size();
        if let Some(oversized) = loaded
            .values()
            .find(|loaded| loaded.dirty && loaded.node.size() > max)
        {
            return Err(StorageError::Oversized {
                len: oversized.node.size(),
                max,
            }
            .into());
        }

        for (id, loaded) in loaded {
            if loaded.dirty {
                store.write(id, loaded.node.as_bytes())?;
            }
        }
        store.set_root(self.root)?;
        Ok(())
    }

    pub fn discard(&mut self) {
        self.loaded.clear();
    }
}
