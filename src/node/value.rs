use crate::{
    error::{Error, Result},
    record::Record,
};

use super::{layout::VALUE_ENTRY_HEADER, SnapshotId};

/// Opaque value bytes tagged with the snapshot they were written in.
///
/// Encoded, this is exactly one entry of a node's value history, and it is
/// also the payload that gets hashed into the node's authenticator. Keeping
/// the snapshot inside the payload lets a verifier learn when a value was
/// written from an existence proof alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub snapshot: SnapshotId,
    pub value: Vec<u8>,
}

/// The payload of a node as of some snapshot, recovered from a proof.
pub type Payload = VersionedValue;

impl VersionedValue {
    pub fn new(snapshot: SnapshotId, value: impl Into<Vec<u8>>) -> Self {
        Self {
            snapshot,
            value: value.into(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        VALUE_ENTRY_HEADER + self.value.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = u16::try_from(self.value.len()).map_err(|_| Error::ValueTooLarge {
            len: self.value.len(),
        })?;

        let mut record = Record::with_capacity(self.encoded_len());
        record.push_u64(self.snapshot);
        record.push_u16(len);
        record.push(&self.value);
        Ok(record.into_vec())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let record = Record::from(bytes);
        let snapshot = record.get_u64(0)?;
        let len = record.get_u16(8)? as usize;

        if record.size() != VALUE_ENTRY_HEADER + len {
            return Err(Error::Deserialization(format!(
                "payload declares {} value bytes but carries {}",
                len,
                record.size().saturating_sub(VALUE_ENTRY_HEADER)
            )));
        }

        Ok(Self::new(snapshot, record.get(VALUE_ENTRY_HEADER, len)?))
    }
}
