use std::ops::Range;

use crate::error::{Error, Result};

/// A growable byte region with big-endian fixed-width accessors.
///
/// Every position is relative to the start of the region. Reads and writes
/// outside of it fail instead of panicking, so a truncated or hostile record
/// surfaces as an error to whoever decodes it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Record(Vec<u8>);

impl Record {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn size(&self) -> usize {
        self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    fn range(&self, pos: usize, len: usize) -> Result<Range<usize>> {
        match pos.checked_add(len) {
            Some(end) if end <= self.0.len() => Ok(pos..end),
            _ => Err(Error::Deserialization(format!(
                "{} bytes at offset {} exceed a record of {} bytes",
                len,
                pos,
                self.0.len()
            ))),
        }
    }

    fn array<const N: usize>(&self, pos: usize) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.get(pos, N)?);
        Ok(out)
    }

    pub fn get(&self, pos: usize, len: usize) -> Result<&[u8]> {
        let range = self.range(pos, len)?;
        Ok(&self.0[range])
    }

    pub fn get_u8(&self, pos: usize) -> Result<u8> {
        Ok(u8::from_be_bytes(self.array(pos)?))
    }

    pub fn get_u16(&self, pos: usize) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array(pos)?))
    }

    pub fn get_u32(&self, pos: usize) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array(pos)?))
    }

    pub fn get_u64(&self, pos: usize) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array(pos)?))
    }

    /// Overwrites `bytes.len()` bytes starting at `pos`.
    pub fn put(&mut self, pos: usize, bytes: &[u8]) -> Result<()> {
        let range = self.range(pos, bytes.len())?;
        self.0[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn put_u8(&mut self, pos: usize, value: u8) -> Result<()> {
        self.put(pos, &value.to_be_bytes())
    }

    pub fn put_u16(&mut self, pos: usize, value: u16) -> Result<()> {
        self.put(pos, &value.to_be_bytes())
    }

    pub fn put_u64(&mut self, pos: usize, value: u64) -> Result<()> {
        self.put(pos, &value.to_be_bytes())
    }

    /// Opens a gap at `pos` and fills it with `bytes`, shifting the tail.
    pub fn insert(&mut self, pos: usize, bytes: &[u8]) -> Result<()> {
        self.replace(pos, 0, bytes)
    }

    /// Removes `len` bytes at `pos`, closing the gap.
    pub fn delete(&mut self, pos: usize, len: usize) -> Result<()> {
        self.replace(pos, len, &[])
    }

    /// Replaces `len` bytes at `pos` with `bytes`, which may be of any length.
    pub fn replace(&mut self, pos: usize, len: usize, bytes: &[u8]) -> Result<()> {
        let range = self.range(pos, len)?;
        self.0.splice(range, bytes.iter().copied());
        Ok(())
    }

    /// Copies `len` bytes at `pos` into a record of their own.
    pub fn extract(&self, pos: usize, len: usize) -> Result<Record> {
        Ok(Record(self.get(pos, len)?.to_vec()))
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    pub fn push_u8(&mut self, value: u8) {
        self.push(&value.to_be_bytes());
    }

    pub fn push_u16(&mut self, value: u16) {
        self.push(&value.to_be_bytes());
    }

    pub fn push_u32(&mut self, value: u32) {
        self.push(&value.to_be_bytes());
    }

    pub fn push_u64(&mut self, value: u64) {
        self.push(&value.to_be_bytes());
    }
}

impl From<Vec<u8>> for Record {
    fn from(bytes: Vec<u8>) -> Self {
        Record(bytes)
    }
}

impl From<&[u8]> for Record {
    fn from(bytes: &[u8]) -> Self {
        Record(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Record {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Record({})", hex::encode(&self.0))
    }
}
