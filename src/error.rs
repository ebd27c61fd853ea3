use std::{array::TryFromSliceError, num::TryFromIntError};

use thiserror::Error as ThisError;

use crate::{
    node::{NodeId, SnapshotId},
    store::StorageError,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Which versioned history of a node a lookup was performed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Left,
    Right,
    Value,
    Authenticator,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Left => write!(f, "left pointer"),
            Field::Right => write!(f, "right pointer"),
            Field::Value => write!(f, "value"),
            Field::Authenticator => write!(f, "authenticator"),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("key is already present")]
    KeyExists,

    #[error("key is not present")]
    KeyNotFound,

    #[error("no {field} entry of node {node} qualifies for snapshot {snapshot}")]
    HistoryLookup {
        node: NodeId,
        field: Field,
        snapshot: SnapshotId,
    },

    #[error("snapshot {0} is not closed")]
    UnknownSnapshot(SnapshotId),

    #[error("key of {len} bytes does not fit a record")]
    KeyTooLarge { len: usize },

    #[error("value of {len} bytes does not fit a record")]
    ValueTooLarge { len: usize },

    #[error("a fresh record needs {required} bytes but the store allows {max}")]
    RecordTooLarge { required: usize, max: usize },

    #[error("record of node {node} is corrupt: {reason}")]
    CorruptRecord { node: NodeId, reason: String },

    #[error("node {0} was used outside of its fetch bracket")]
    NotLoaded(NodeId),

    #[error("tree structure is corrupted: {0}")]
    Corrupted(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to deserialize: {0}")]
    Deserialization(String),
}

impl From<hex::FromHexError> for Error {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn from(error: hex::FromHexError) -> Self {
        Error::Deserialization(format!("{}", error))
    }
}

impl From<TryFromIntError> for Error {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn from(error: TryFromIntError) -> Self {
        Error::Deserialization(format!("invalid number format: {}", error))
    }
}

impl From<TryFromSliceError> for Error {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn from(error: TryFromSliceError) -> Self {
        Error::Deserialization(format!("invalid slice format: {}", error))
    }
}
