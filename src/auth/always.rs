use crate::{
    error::Result,
    hash::{Hash, HASH_SIZE},
    node::{Node, SnapshotId},
    prelude::FromBytes,
    record::Record,
};

use super::AuthenticatorCache;

const ENTRY_SIZE: usize = 8 + HASH_SIZE;

/// Keeps one `(snapshot, authenticator)` entry for every snapshot that
/// modified the node. An entry stays valid until the next one, so historical
/// lookups are plain floor lookups and never recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysCache;

fn decode(entry: &[u8]) -> Result<(SnapshotId, Hash)> {
    let record = Record::from(entry);
    Ok((record.get_u64(0)?, Hash::from_bytes(record.get(8, HASH_SIZE)?)?))
}

impl AuthenticatorCache for AlwaysCache {
    fn entry_size(&self) -> usize {
        ENTRY_SIZE
    }

    fn should_store(&self, _snapshot: SnapshotId, _depth: usize) -> bool {
        true
    }

    fn entry(&self, snapshot: SnapshotId, authenticator: &Hash) -> Vec<u8> {
        let mut record = Record::with_capacity(ENTRY_SIZE);
        record.push_u64(snapshot);
        record.push(authenticator.as_ref());
        record.into_vec()
    }

    fn lookup(&self, node: &Node, snapshot: SnapshotId) -> Result<Option<Hash>> {
        for index in 0..node.authenticator_count()? {
            let (from, authenticator) = decode(node.authenticator_entry(index)?)?;
            if from <= snapshot {
                return Ok(Some(authenticator));
            }
        }
        Ok(None)
    }

    fn retire(&self, _node: &mut Node, _snapshot: SnapshotId) -> Result<()> {
        Ok(())
    }

    fn cleanup_after(&self, node: &mut Node, snapshot: SnapshotId) -> Result<()> {
        if node.authenticator_count()? > 0 && decode(node.authenticator_entry(0)?)?.0 == snapshot {
            node.remove_authenticator_entry(0)?;
        }
        Ok(())
    }
}
