use thiserror::Error as ThisError;

use crate::{
    hash::Hash,
    node::{NodeId, SnapshotId},
};

mod cache;
mod memory;

pub use cache::NodeCache;
pub use memory::{MemoryStore, DEFAULT_MAX_RECORD_SIZE};

#[derive(Debug, ThisError)]
pub enum StorageError {
    #[error("node {0} is not stored")]
    NotFound(NodeId),

    #[error("snapshot {0} has not been closed")]
    UnknownSnapshot(SnapshotId),

    #[error("record of {len} bytes exceeds the {max} byte ceiling")]
    Oversized { len: usize, max: usize },

    /// Backend I/O or database error.
    #[error("backend error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Persistence for tree nodes and snapshot metadata.
///
/// A store turns node records into opaque byte blobs under stable ids and
/// remembers, for every closed snapshot, its root node and root
/// authenticator. Snapshots are numbered from 1, and the open snapshot is
/// always the one after the last closed snapshot.
///
/// Stores never interpret records. Loading, reference counting and write-back
/// of decoded nodes is done by [`NodeCache`] on top of a store.
pub trait NodeStore {
    /// Reserves a fresh id that has never been handed out before.
    ///
    /// # Errors
    /// Returns `StorageError` if the id space of the backend is exhausted.
    fn allocate_id(&mut self) -> Result<NodeId, StorageError>;

    /// Reads the record last written under `id`.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if nothing was written under `id`.
    fn read(&self, id: NodeId) -> Result<Vec<u8>, StorageError>;

    /// Stores `record` under `id`, replacing any previous version.
    ///
    /// # Errors
    /// Returns `StorageError::Oversized` if `record` is larger than
    /// [`NodeStore::max_record_size`].
    fn write(&mut self, id: NodeId, record: &[u8]) -> Result<(), StorageError>;

    /// The open snapshot, one past the last closed one.
    fn current_snapshot(&self) -> SnapshotId;

    /// Root of the open snapshot, [`NodeId::NIL`] for an empty tree.
    fn root(&self) -> NodeId;

    /// Root of a closed snapshot.
    ///
    /// # Errors
    /// Returns `StorageError::UnknownSnapshot` if `snapshot` is not closed.
    fn root_at(&self, snapshot: SnapshotId) -> Result<NodeId, StorageError>;

    fn set_root(&mut self, root: NodeId) -> Result<(), StorageError>;

    /// Root authenticator recorded when `snapshot` closed.
    ///
    /// # Errors
    /// Returns `StorageError::UnknownSnapshot` if `snapshot` is not closed.
    fn authenticator_at(&self, snapshot: SnapshotId) -> Result<Hash, StorageError>;

    /// Seals the open snapshot with its root and authenticator, returning the
    /// id of the snapshot just closed.
    fn close_snapshot(&mut self, root: NodeId, authenticator: Hash)
        -> Result<SnapshotId, StorageError>;

    /// Largest record, in bytes, this store accepts.
    fn max_record_size(&self) -> usize;
}
