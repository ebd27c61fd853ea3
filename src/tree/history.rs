use std::cmp::Ordering;

use digest::Digest;

use super::Tree;
use crate::{
    error::{Error, Result},
    hash::Hash,
    node::{Node, SnapshotId, Slot},
    proof::ExistenceProof,
    store::NodeStore,
};

/// A write recorded in a closed snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// The key did not exist before the snapshot.
    Insert { key: Vec<u8>, value: Vec<u8> },
    /// The key existed and got a new value.
    Update { key: Vec<u8>, value: Vec<u8> },
}

impl Change {
    pub fn key(&self) -> &[u8] {
        match self {
            Change::Insert { key, .. } | Change::Update { key, .. } => key,
        }
    }

    pub fn value(&self) -> &[u8] {
        match self {
            Change::Insert { value, .. } | Change::Update { value, .. } => value,
        }
    }
}

impl<D: Digest, S: NodeStore> Tree<D, S> {
    /// Proves whether `key` is present in a closed snapshot.
    ///
    /// The proof validates against [`Tree::root_authenticator`] of the same
    /// snapshot. An empty tree yields an empty proof.
    pub fn is_member(&self, snapshot: SnapshotId, key: &[u8]) -> Result<ExistenceProof<D>> {
        let mut id = self.root_at(snapshot)?;
        let mut proof = ExistenceProof::new();

        while !id.is_nil() {
            let node = self.load(id)?;
            proof.push_node(node.key(), node.payload_at(snapshot)?)?;

            let left = node.child_at(Slot::Left, snapshot)?;
            let right = node.child_at(Slot::Right, snapshot)?;
            match key.cmp(node.key()) {
                Ordering::Equal => {
                    proof.push_authenticator(self.authenticator_at(left, snapshot)?)?;
                    proof.push_authenticator(self.authenticator_at(right, snapshot)?)?;
                    proof.decide(true);
                    return Ok(proof);
                }
                Ordering::Less => {
                    proof.push_authenticator(self.authenticator_at(right, snapshot)?)?;
                    id = left;
                }
                Ordering::Greater => {
                    proof.push_authenticator(self.authenticator_at(left, snapshot)?)?;
                    id = right;
                }
            }

            if id.is_nil() {
                proof.push_authenticator(Hash::zero())?;
            }
        }

        proof.decide(false);
        Ok(proof)
    }

    /// Every key whose value was written in a closed `snapshot`, in key order.
    pub fn changes(&self, snapshot: SnapshotId) -> Result<Vec<Change>> {
        let root = self.root_at(snapshot)?;

        let mut written = Vec::new();
        self.walk(root, snapshot, &mut |node: &Node| {
            let versioned = node.versioned_value_at(snapshot)?;
            if versioned.snapshot == snapshot {
                written.push((node.key().to_vec(), versioned.value));
            }
            Ok(())
        })?;

        written
            .into_iter()
            .map(|(key, value)| -> Result<Change> {
                let existed = snapshot > 1 && self.get_at(snapshot - 1, &key)?.is_some();
                Ok(if existed {
                    Change::Update { key, value }
                } else {
                    Change::Insert { key, value }
                })
            })
            .collect()
    }

    /// Replays changes into the open snapshot.
    ///
    /// # Errors
    /// [`Error::KeyExists`] for an insert of a present key and
    /// [`Error::KeyNotFound`] for an update of an absent one. Changes before
    /// the failing one stay applied.
    pub fn apply(&mut self, changes: &[Change]) -> Result<()> {
        for change in changes {
            match change {
                Change::Insert { key, value } => self.insert(key, value)?,
                Change::Update { key, value } => {
                    if self.update(key, value)?.is_none() {
                        return Err(Error::KeyNotFound);
                    }
                }
            }
        }
        Ok(())
    }
}
