use std::num::NonZeroU32;

use crate::{
    error::Result,
    hash::{Hash, HASH_SIZE},
    node::{Node, SnapshotId},
    prelude::FromBytes,
    record::Record,
};

use super::AuthenticatorCache;

const ENTRY_SIZE: usize = 8 + 8 + HASH_SIZE;

/// Upper bound of an entry that is still valid in the open snapshot.
const OPEN: SnapshotId = 0;

/// Stores an authenticator only on the levels selected by the snapshot:
/// a node at `depth` keeps what it computed while closing snapshot `s` when
/// `(s - 1) % n == depth % n`. Over `n` consecutive snapshots every level gets
/// its turn.
///
/// Entries are `(from, to, authenticator)` validity intervals, with `to` left
/// open until the node changes again. Anything not covered by an interval is
/// recomputed from the children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthModuloCache {
    modulus: NonZeroU32,
}

impl DepthModuloCache {
    pub fn new(modulus: NonZeroU32) -> Self {
        Self { modulus }
    }

    pub fn modulus(&self) -> NonZeroU32 {
        self.modulus
    }
}

struct Interval {
    from: SnapshotId,
    to: SnapshotId,
    authenticator: Hash,
}

impl Interval {
    fn decode(entry: &[u8]) -> Result<Self> {
        let record = Record::from(entry);
        Ok(Self {
            from: record.get_u64(0)?,
            to: record.get_u64(8)?,
            authenticator: Hash::from_bytes(record.get(16, HASH_SIZE)?)?,
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut record = Record::with_capacity(ENTRY_SIZE);
        record.push_u64(self.from);
        record.push_u64(self.to);
        record.push(self.authenticator.as_ref());
        record.into_vec()
    }

    fn covers(&self, snapshot: SnapshotId) -> bool {
        self.from <= snapshot && (self.to == OPEN || snapshot <= self.to)
    }

    fn is_open(&self) -> bool {
        self.to == OPEN
    }
}

/// Closes the newest interval at `snapshot - 1` if it is still open.
fn close_newest(node: &mut Node, snapshot: SnapshotId) -> Result<()> {
    if node.authenticator_count()? == 0 {
        return Ok(());
    }

    let mut newest = Interval::decode(node.authenticator_entry(0)?)?;
    if newest.is_open() {
        newest.to = snapshot.saturating_sub(1);
        node.replace_authenticator_entry(0, &newest.encode())?;
    }
    Ok(())
}

impl AuthenticatorCache for DepthModuloCache {
    fn entry_size(&self) -> usize {
        ENTRY_SIZE
    }

    fn should_store(&self, snapshot: SnapshotId, depth: usize) -> bool {
        let modulus = u64::from(self.modulus.get());
        snapshot.saturating_sub(1) % modulus == depth as u64 % modulus
    }

    fn entry(&self, snapshot: SnapshotId, authenticator: &Hash) -> Vec<u8> {
        Interval {
            from: snapshot,
            to: OPEN,
            authenticator: *authenticator,
        }
        .encode()
    }

    fn lookup(&self, node: &Node, snapshot: SnapshotId) -> Result<Option<Hash>> {
        for index in 0..node.authenticator_count()? {
            let interval = Interval::decode(node.authenticator_entry(index)?)?;
            if interval.covers(snapshot) {
                return Ok(Some(interval.authenticator));
            }
        }
        Ok(None)
    }

    fn retire(&self, node: &mut Node, snapshot: SnapshotId) -> Result<()> {
        close_newest(node, snapshot)
    }

    fn cleanup_after(&self, node: &mut Node, snapshot: SnapshotId) -> Result<()> {
        if node.authenticator_count()? > 0
            && Interval::decode(node.authenticator_entry(0)?)?.from == snapshot
        {
            node.remove_authenticator_entry(0)?;
        }
        close_newest(node, snapshot)
    }
}
