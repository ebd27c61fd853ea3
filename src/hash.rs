use std::fmt::{Display, Formatter};

use digest::Digest;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;

use crate::{
    error::Result,
    prelude::{FromBytes, ToBytes},
};

/// Size in bytes of every digest used by the tree.
pub const HASH_SIZE: usize = 32;

/// A 32-byte digest, used both for node priorities and authenticators.
///
/// Digest algorithms plugged into the tree must produce exactly [`HASH_SIZE`] bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Hash([u8; HASH_SIZE]);

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Arbitrary for Hash {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        any::<[u8; HASH_SIZE]>().prop_map(Hash::new).boxed()
    }
}

impl Hash {
    /// Creates a new Hash from any type that can be converted into [u8; 32].
    pub fn new<T: Into<[u8; HASH_SIZE]>>(data: T) -> Self {
        Hash(data.into())
    }

    /// Returns a zero hash (all bytes set to 0).
    ///
    /// This is also the authenticator of the empty (nil) subtree.
    pub fn zero() -> Self {
        Self([0u8; HASH_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    /// Creates a new Hash from a hexadecimal string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = hex::decode(hex)?;

        if bytes.len() != HASH_SIZE {
            return Err(hex::FromHexError::InvalidStringLength)?;
        }

        Ok(Self::from_digest(&bytes))
    }

    pub fn digest<D: Digest>(data: &[u8]) -> Self {
        let mut hasher = D::new();
        hasher.update(data);
        Hash::from_digest(&hasher.finalize())
    }

    /// Wraps a finalized digest output, which must be [`HASH_SIZE`] bytes
    /// long. Debug builds panic on any other size; release builds truncate or
    /// zero-pad.
    pub fn from_digest(output: &[u8]) -> Self {
        debug_assert_eq!(output.len(), HASH_SIZE, "digests must produce {HASH_SIZE} bytes");
        let mut inner = [0u8; HASH_SIZE];
        let len = output.len().min(HASH_SIZE);
        inner[..len].copy_from_slice(&output[..len]);
        Hash(inner)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl Default for Hash {
    fn default() -> Self {
        Hash::zero()
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(array: [u8; HASH_SIZE]) -> Self {
        Hash(array)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for Hash {
    fn as_mut(&mut self) -> &mut [u8] {
        self.0.as_mut()
    }
}

impl From<Hash> for [u8; HASH_SIZE] {
    fn from(val: Hash) -> Self {
        val.0
    }
}

impl ToBytes for Hash {
    type Output = [u8; HASH_SIZE];

    fn to_bytes(&self) -> Self::Output {
        self.0
    }
}

impl FromBytes for Hash {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner: [u8; HASH_SIZE] = bytes.try_into()?;
        Ok(Hash(inner))
    }
}
