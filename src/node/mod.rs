//! Multi-version tree nodes.
//!
//! A node is a single variable-length [`Record`] holding an immutable key and
//! priority plus independent histories for its left pointer, right pointer,
//! cached authenticators and value. Each history is a list of entries ordered
//! newest snapshot first, and the state of a field as of snapshot `s` is the
//! first entry whose snapshot is `<= s` (a floor lookup).
//!
//! Edits made while a snapshot is open either grow the record in place or
//! report [`Edit::Overflow`] when the record would cross the store's size
//! ceiling. Deciding what to do about an overflow is the tree's job.

mod layout;
mod value;

use std::fmt::{self, Debug, Display, Formatter};

pub use layout::fresh_size;
pub use value::{Payload, VersionedValue};

use layout::*;

use crate::{
    error::{Error, Field, Result},
    hash::{Hash, HASH_SIZE},
    prelude::FromBytes,
    record::Record,
};

/// Snapshots are numbered from 1; the open snapshot is always the newest one.
pub type SnapshotId = u64;

/// Reads through this snapshot see the newest entry of every history.
pub(crate) const LATEST: SnapshotId = SnapshotId::MAX;

/// Storage-assigned node identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// The empty subtree.
    pub const NIL: NodeId = NodeId(u64::MAX);

    pub const fn new(raw: u64) -> Self {
        NodeId(raw)
    }

    pub fn is_nil(self) -> bool {
        self == Self::NIL
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "nil")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Left,
    Right,
}

impl Slot {
    pub fn opposite(self) -> Slot {
        match self {
            Slot::Left => Slot::Right,
            Slot::Right => Slot::Left,
        }
    }

    fn field(self) -> Field {
        match self {
            Slot::Left => Field::Left,
            Slot::Right => Field::Right,
        }
    }

    fn count_at(self) -> usize {
        match self {
            Slot::Left => LEFT_COUNT,
            Slot::Right => RIGHT_COUNT,
        }
    }
}

/// Outcome of an in-place edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Edit {
    Applied,
    /// The record was left untouched because the edit would not fit.
    Overflow,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    key: Vec<u8>,
    priority: Hash,
    record: Record,
    auth_entry_size: usize,
}

impl Node {
    /// Builds a fresh node whose child pointers are stamped with `snapshot`.
    ///
    /// The value keeps its own snapshot, so a node rebuilt during relocation
    /// hashes to the same authenticator as the one it replaces. Fresh nodes are
    /// born modified and without cached authenticators.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        id: NodeId,
        key: &[u8],
        priority: Hash,
        value: &VersionedValue,
        left: NodeId,
        right: NodeId,
        snapshot: SnapshotId,
        auth_entry_size: usize,
    ) -> Result<Self> {
        let key_len =
            u16::try_from(key.len()).map_err(|_| Error::KeyTooLarge { len: key.len() })?;
        let entry = value.encode()?;

        let mut record = Record::with_capacity(fresh_size(key.len(), value.value.len()));
        record.push_u16(key_len);
        record.push_u16(1);
        record.push_u16(1);
        record.push_u16(0);
        record.push_u16(1);
        record.push(priority.as_ref());
        record.push_u8(1);
        record.push(key);
        record.push_u64(snapshot);
        record.push_u64(left.as_u64());
        record.push_u64(snapshot);
        record.push_u64(right.as_u64());
        record.push(&entry);

        Ok(Self {
            id,
            key: key.to_vec(),
            priority,
            record,
            auth_entry_size,
        })
    }

    /// Parses a stored record, validating that its histories exactly cover it.
    pub fn decode(id: NodeId, bytes: Vec<u8>, auth_entry_size: usize) -> Result<Self> {
        let corrupt = |reason: String| Error::CorruptRecord { node: id, reason };
        let record = Record::from(bytes);

        if record.size() < HEADER_SIZE {
            return Err(corrupt(format!(
                "{} bytes cannot hold a {} byte header",
                record.size(),
                HEADER_SIZE
            )));
        }

        let key_len = record.get_u16(KEY_LEN)? as usize;
        let children = record.get_u16(LEFT_COUNT)? as usize + record.get_u16(RIGHT_COUNT)? as usize;
        let auths = record.get_u16(AUTH_COUNT)? as usize;
        let values = record.get_u16(VALUE_COUNT)? as usize;

        let mut pos = HEADER_SIZE + key_len + children * CHILD_ENTRY_SIZE + auths * auth_entry_size;
        for index in 0..values {
            let len = record
                .get_u16(pos + 8)
                .map_err(|_| corrupt(format!("value entry {} is truncated", index)))?;
            pos += VALUE_ENTRY_HEADER + len as usize;
        }

        if pos != record.size() {
            return Err(corrupt(format!(
                "layout covers {} bytes but the record has {}",
                pos,
                record.size()
            )));
        }

        if record.get_u8(MODIFIED)? > 1 {
            return Err(corrupt("modified flag is not a boolean".to_string()));
        }

        Ok(Self {
            id,
            key: record.get(HEADER_SIZE, key_len)?.to_vec(),
            priority: Hash::from_bytes(record.get(PRIORITY, HASH_SIZE)?)?,
            record,
            auth_entry_size,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn priority(&self) -> &Hash {
        &self.priority
    }

    pub fn size(&self) -> usize {
        self.record.size()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.record.as_bytes()
    }

    /// Whether growing the record by `extra` bytes keeps it within `max`.
    pub fn fits(&self, extra: usize, max: usize) -> bool {
        self.size().saturating_add(extra) <= max
    }

    /// A modified node has a stale authenticator for the open snapshot.
    pub fn is_modified(&self) -> Result<bool> {
        Ok(self.record.get_u8(MODIFIED)? == 1)
    }

    pub fn set_modified(&mut self, modified: bool) -> Result<()> {
        self.record.put_u8(MODIFIED, modified as u8)
    }

    fn count(&self, at: usize) -> Result<usize> {
        Ok(self.record.get_u16(at)? as usize)
    }

    fn set_count(&mut self, at: usize, count: usize) -> Result<()> {
        self.record.put_u16(at, u16::try_from(count)?)
    }

    fn children_start(&self) -> usize {
        HEADER_SIZE + self.key.len()
    }

    fn child_section(&self, slot: Slot) -> Result<(usize, usize)> {
        let left = self.count(LEFT_COUNT)?;
        match slot {
            Slot::Left => Ok((self.children_start(), left)),
            Slot::Right => Ok((
                self.children_start() + left * CHILD_ENTRY_SIZE,
                self.count(RIGHT_COUNT)?,
            )),
        }
    }

    fn auth_section(&self) -> Result<(usize, usize)> {
        let (start, count) = self.child_section(Slot::Right)?;
        Ok((start + count * CHILD_ENTRY_SIZE, self.count(AUTH_COUNT)?))
    }

    fn value_section(&self) -> Result<(usize, usize)> {
        let (start, count) = self.auth_section()?;
        Ok((start + count * self.auth_entry_size, self.count(VALUE_COUNT)?))
    }

    fn lookup_error(&self, field: Field, snapshot: SnapshotId) -> Error {
        Error::HistoryLookup {
            node: self.id,
            field,
            snapshot,
        }
    }

    /// The child pointer in the open snapshot.
    pub fn child(&self, slot: Slot) -> Result<NodeId> {
        self.child_at(slot, LATEST)
    }

    pub fn child_at(&self, slot: Slot, snapshot: SnapshotId) -> Result<NodeId> {
        let (start, count) = self.child_section(slot)?;
        for index in 0..count {
            let pos = start + index * CHILD_ENTRY_SIZE;
            if self.record.get_u64(pos)? <= snapshot {
                return Ok(NodeId(self.record.get_u64(pos + 8)?));
            }
        }
        Err(self.lookup_error(slot.field(), snapshot))
    }

    /// Every entry of a child history, newest first.
    pub fn child_history(&self, slot: Slot) -> Result<Vec<(SnapshotId, NodeId)>> {
        let (start, count) = self.child_section(slot)?;
        (0..count)
            .map(|index| {
                let pos = start + index * CHILD_ENTRY_SIZE;
                Ok((self.record.get_u64(pos)?, NodeId(self.record.get_u64(pos + 8)?)))
            })
            .collect()
    }

    /// Position and total length of the value entry visible at `snapshot`.
    fn value_entry_at(&self, snapshot: SnapshotId) -> Result<(usize, usize)> {
        let (mut pos, count) = self.value_section()?;
        for _ in 0..count {
            let len = VALUE_ENTRY_HEADER + self.record.get_u16(pos + 8)? as usize;
            if self.record.get_u64(pos)? <= snapshot {
                return Ok((pos, len));
            }
            pos += len;
        }
        Err(self.lookup_error(Field::Value, snapshot))
    }

    /// The raw value entry at `snapshot`, as hashed into authenticators.
    pub fn payload_at(&self, snapshot: SnapshotId) -> Result<Vec<u8>> {
        let (pos, len) = self.value_entry_at(snapshot)?;
        Ok(self.record.extract(pos, len)?.into_vec())
    }

    pub fn versioned_value_at(&self, snapshot: SnapshotId) -> Result<VersionedValue> {
        VersionedValue::decode(&self.payload_at(snapshot)?)
    }

    pub fn value_at(&self, snapshot: SnapshotId) -> Result<Vec<u8>> {
        Ok(self.versioned_value_at(snapshot)?.value)
    }

    pub fn versioned_value(&self) -> Result<VersionedValue> {
        self.versioned_value_at(LATEST)
    }

    pub fn value(&self) -> Result<Vec<u8>> {
        self.value_at(LATEST)
    }

    /// Points `slot` at `child` as of the open `snapshot`.
    ///
    /// An entry already stamped with `snapshot` is overwritten, otherwise a new
    /// one is prepended if the record stays within `max` bytes.
    pub fn try_set_child(
        &mut self,
        slot: Slot,
        child: NodeId,
        snapshot: SnapshotId,
        max: usize,
    ) -> Result<Edit> {
        let (start, count) = self.child_section(slot)?;

        if count > 0 && self.record.get_u64(start)? == snapshot {
            self.record.put_u64(start + 8, child.as_u64())?;
        } else {
            if count >= u16::MAX as usize || !self.fits(CHILD_ENTRY_SIZE, max) {
                return Ok(Edit::Overflow);
            }

            let mut entry = Record::with_capacity(CHILD_ENTRY_SIZE);
            entry.push_u64(snapshot);
            entry.push_u64(child.as_u64());
            self.record.insert(start, entry.as_bytes())?;
            self.set_count(slot.count_at(), count + 1)?;
        }

        self.set_modified(true)?;
        Ok(Edit::Applied)
    }

    /// Sets the value as of the open `snapshot`, replacing an entry already
    /// written in it even when the new value has a different length.
    pub fn try_set_value(
        &mut self,
        value: &[u8],
        snapshot: SnapshotId,
        max: usize,
    ) -> Result<Edit> {
        let entry = VersionedValue::new(snapshot, value).encode()?;
        let (start, count) = self.value_section()?;

        if count > 0 && self.record.get_u64(start)? == snapshot {
            let current = VALUE_ENTRY_HEADER + self.record.get_u16(start + 8)? as usize;
            if entry.len() > current && !self.fits(entry.len() - current, max) {
                return Ok(Edit::Overflow);
            }
            self.record.replace(start, current, &entry)?;
        } else {
            if count >= u16::MAX as usize || !self.fits(entry.len(), max) {
                return Ok(Edit::Overflow);
            }
            self.record.insert(start, &entry)?;
            self.set_count(VALUE_COUNT, count + 1)?;
        }

        self.set_modified(true)?;
        Ok(Edit::Applied)
    }

    /// Drops the child and value entries written in `snapshot`, leaving the
    /// node as it was when the previous snapshot closed.
    pub fn strip_snapshot(&mut self, snapshot: SnapshotId) -> Result<()> {
        for slot in [Slot::Left, Slot::Right] {
            let (start, count) = self.child_section(slot)?;
            if count > 0 && self.record.get_u64(start)? == snapshot {
                self.record.delete(start, CHILD_ENTRY_SIZE)?;
                self.set_count(slot.count_at(), count - 1)?;
            }
        }

        let (start, count) = self.value_section()?;
        if count > 0 && self.record.get_u64(start)? == snapshot {
            let len = VALUE_ENTRY_HEADER + self.record.get_u16(start + 8)? as usize;
            self.record.delete(start, len)?;
            self.set_count(VALUE_COUNT, count - 1)?;
        }

        Ok(())
    }

    pub fn auth_entry_size(&self) -> usize {
        self.auth_entry_size
    }

    pub fn authenticator_count(&self) -> Result<usize> {
        self.count(AUTH_COUNT)
    }

    pub fn authenticator_entry(&self, index: usize) -> Result<&[u8]> {
        let (start, count) = self.auth_section()?;
        if index >= count {
            return Err(self.lookup_error(Field::Authenticator, index as SnapshotId));
        }
        self.record
            .get(start + index * self.auth_entry_size, self.auth_entry_size)
    }

    /// Overwrites an existing cache entry with one of the same size.
    pub fn replace_authenticator_entry(&mut self, index: usize, entry: &[u8]) -> Result<()> {
        let (start, count) = self.auth_section()?;
        if index >= count || entry.len() != self.auth_entry_size {
            return Err(Error::CorruptRecord {
                node: self.id,
                reason: format!("cannot replace authenticator entry {} of {}", index, count),
            });
        }
        self.record.put(start + index * self.auth_entry_size, entry)
    }

    pub fn remove_authenticator_entry(&mut self, index: usize) -> Result<()> {
        let (start, count) = self.auth_section()?;
        if index >= count {
            return Err(self.lookup_error(Field::Authenticator, index as SnapshotId));
        }
        self.record
            .delete(start + index * self.auth_entry_size, self.auth_entry_size)?;
        self.set_count(AUTH_COUNT, count - 1)
    }

    /// Prepends a cache entry, making it the newest one.
    pub fn try_push_authenticator(&mut self, entry: &[u8], max: usize) -> Result<Edit> {
        let (start, count) = self.auth_section()?;
        if entry.len() != self.auth_entry_size {
            return Err(Error::CorruptRecord {
                node: self.id,
                reason: format!(
                    "authenticator entry of {} bytes, expected {}",
                    entry.len(),
                    self.auth_entry_size
                ),
            });
        }
        if count >= u16::MAX as usize || !self.fits(entry.len(), max) {
            return Ok(Edit::Overflow);
        }

        self.record.insert(start, entry)?;
        self.set_count(AUTH_COUNT, count + 1)?;
        Ok(Edit::Applied)
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("key", &hex::encode(&self.key))
            .field("priority", &self.priority)
            .field("modified", &self.is_modified().ok())
            .field("left", &self.child_history(Slot::Left).ok())
            .field("right", &self.child_history(Slot::Right).ok())
            .field("authenticators", &self.authenticator_count().ok())
            .field("size", &self.size())
            .finish()
    }
}
