use std::collections::BTreeMap;

use super::{NodeStore, StorageError};
use crate::{
    hash::Hash,
    node::{NodeId, SnapshotId},
};

/// Records are capped at 1 MiB unless configured otherwise.
pub const DEFAULT_MAX_RECORD_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sealed {
    root: NodeId,
    authenticator: Hash,
}

/// In-memory node store.
///
/// Keeps every record ever written, so all closed snapshots stay readable.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    records: BTreeMap<NodeId, Vec<u8>>,
    next_id: u64,
    root: NodeId,
    snapshots: Vec<Sealed>,
    max_record_size: usize,
    largest_record: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_max_record_size(DEFAULT_MAX_RECORD_SIZE)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_record_size(max_record_size: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: 0,
            root: NodeId::NIL,
            snapshots: Vec::new(),
            max_record_size,
            largest_record: 0,
        }
    }

    /// Number of records written so far, reachable or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Size of the largest record ever written.
    pub fn largest_record(&self) -> usize {
        self.largest_record
    }

    fn sealed(&self, snapshot: SnapshotId) -> Result<&Sealed, StorageError> {
        snapshot
            .checked_sub(1)
            .and_then(|index| self.snapshots.get(index as usize))
            .ok_or(StorageError::UnknownSnapshot(snapshot))
    }
}

impl NodeStore for MemoryStore {
    fn allocate_id(&mut self) -> Result<NodeId, StorageError> {
        let id = NodeId::new(self.next_id);
        if id.is_nil() {
            return Err(StorageError::Backend("node ids exhausted".into()));
        }
        self.next_id += 1;
        Ok(id)
    }

    fn read(&self, id: NodeId) -> Result<Vec<u8>, StorageError> {
        self.records
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    fn write(&mut self, id: NodeId, record: &[u8]) -> Result<(), StorageError> {
        if record.len() > self.max_record_size {
            return Err(StorageError::Oversized {
                len: record.len(),
                max: self.max_record_size,
            });
        }

        self.largest_record = self.largest_record.max(record.len());
        self.records.insert(id, record.to_vec());
        Ok(())
    }

    fn current_snapshot(&self) -> SnapshotId {
        self.snapshots.len() as SnapshotId + 1
    }

    fn root(&self) -> NodeId {
        self.root
    }

    fn root_at(&self, snapshot: SnapshotId) -> Result<NodeId, StorageError> {
        Ok(self.sealed(snapshot)?.root)
    }

    fn set_root(&mut self, root: NodeId) -> Result<(), StorageError> {
        self.root = root;
        Ok(())
    }

    fn authenticator_at(&self, snapshot: SnapshotId) -> Result<Hash, StorageError> {
        Ok(self.sealed(snapshot)?.authenticator)
    }

    fn close_snapshot(
        &mut self,
        root: NodeId,
        authenticator: Hash,
    ) -> Result<SnapshotId, StorageError> {
        self.root = root;
        self.snapshots.push(Sealed {
            root,
            authenticator,
        });
        Ok(self.snapshots.len() as SnapshotId)
    }

    fn max_record_size(&self) -> usize {
        self.max_record_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::test_node_store!(memory_store, MemoryStore::default());

    #[test]
    fn test_largest_record_tracks_writes() {
        let mut store = MemoryStore::with_max_record_size(8);
        let id = store.allocate_id().unwrap();

        store.write(id, &[1, 2, 3]).unwrap();
        store.write(id, &[1]).unwrap();
        assert_eq!(store.largest_record(), 3);

        assert!(matches!(
            store.write(id, &[0; 9]),
            Err(StorageError::Oversized { len: 9, max: 8 })
        ));
        assert_eq!(store.read(id).unwrap(), vec![1]);
        assert_eq!(store.len(), 1);
    }
}
