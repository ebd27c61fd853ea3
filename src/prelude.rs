pub use crate::{
    auth::{authenticator, AlwaysCache, AuthenticatorCache, DepthModuloCache},
    error::*,
    hash::*,
    node::{NodeId, Payload, SnapshotId, Slot, VersionedValue},
    path::{Edge, TreePath},
    proof::ExistenceProof,
    store::{MemoryStore, NodeCache, NodeStore, StorageError},
    tree::{Change, Tree},
};

pub trait FromBytes
where
    Self: Sized,
{
    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}

pub trait ToBytes {
    type Output: AsRef<[u8]>;

    /// Converts the value to a representation in bytes.
    fn to_bytes(&self) -> Self::Output;

    /// Converts the value to a representation in bytes, as a vector.
    ///
    /// This is a convenience method, and automatically derived from `to_bytes`.
    fn to_bytes_vec(&self) -> Vec<u8> {
        self.to_bytes().as_ref().to_vec()
    }
}

pub trait FromHex
where
    Self: Sized,
{
    fn from_hex(hex: &str) -> Result<Self>;
}

pub trait ToHex {
    fn to_hex(&self) -> String;
}

impl<T: FromBytes> FromHex for T {
    fn from_hex(hex: &str) -> Result<Self> {
        T::from_bytes(&hex::decode(hex)?)
    }
}

impl<T: ToBytes> ToHex for T {
    fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}
