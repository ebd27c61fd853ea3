use std::{cmp::Ordering, marker::PhantomData};

use digest::Digest;

use crate::{
    auth::authenticator,
    error::{Error, Result},
    hash::{Hash, HASH_SIZE},
    node::Payload,
    prelude::{FromBytes, ToBytes},
    record::Record,
};

/// Evidence that a key is, or is not, present in a snapshot.
///
/// The proof records the key and payload of every node on the search path,
/// root first, and the authenticator of the branch not taken at each of them.
/// One more authenticator closes the path: the nil subtree where a missing key
/// would have been, or the right subtree of the node holding the key (whose
/// left subtree then sits in the previous slot). A verifier holding only the
/// root authenticator of the snapshot can replay the hashes bottom-up.
pub struct ExistenceProof<D: Digest> {
    keys: Vec<Vec<u8>>,
    payloads: Vec<Vec<u8>>,
    authenticators: Vec<Hash>,
    found: bool,
    _phantom: PhantomData<D>,
}

impl<D: Digest> ExistenceProof<D> {
    /// An empty proof, which is what an empty tree produces for every key.
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            payloads: Vec::new(),
            authenticators: Vec::new(),
            found: false,
            _phantom: PhantomData,
        }
    }

    /// Appends the next node of the search path.
    ///
    /// Every length and count of a proof fits the u32 prefixes of its byte
    /// encoding, so oversized parts are rejected here rather than on encode.
    pub(crate) fn push_node(&mut self, key: &[u8], payload: Vec<u8>) -> Result<()> {
        length(key.len())?;
        length(payload.len())?;
        length(self.keys.len() + 1)?;

        self.keys.push(key.to_vec());
        self.payloads.push(payload);
        Ok(())
    }

    pub(crate) fn push_authenticator(&mut self, authenticator: Hash) -> Result<()> {
        length(self.authenticators.len() + 1)?;
        self.authenticators.push(authenticator);
        Ok(())
    }

    pub(crate) fn decide(&mut self, found: bool) {
        self.found = found;
    }

    pub fn found(&self) -> bool {
        self.found
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of nodes on the recorded path.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[Vec<u8>] {
        &self.keys
    }

    pub fn payloads(&self) -> &[Vec<u8>] {
        &self.payloads
    }

    pub fn authenticators(&self) -> &[Hash] {
        &self.authenticators
    }

    /// The payload of the node holding the key, when it was found.
    pub fn payload(&self) -> Result<Option<Payload>> {
        match (self.found, self.payloads.last()) {
            (true, Some(payload)) => Ok(Some(Payload::decode(payload)?)),
            _ => Ok(None),
        }
    }

    /// Checks the proof for `key` against the root authenticator `target`.
    ///
    /// Never trusts the producer: a malformed proof, a path that does not
    /// follow `key`, or a found flag that contradicts the path all yield
    /// `false`.
    pub fn validate(&self, key: &[u8], target: &Hash) -> bool {
        let count = self.keys.len();
        if count == 0 {
            return !self.found && self.authenticators.is_empty() && target.is_zero();
        }
        if self.payloads.len() != count || self.authenticators.len() != count + 1 {
            return false;
        }

        let last = count - 1;
        let ordering = key.cmp(&self.keys[last]);
        if self.found != (ordering == Ordering::Equal) {
            return false;
        }
        if !self.found && !self.authenticators[count].is_zero() {
            return false;
        }

        let (left, right) = match ordering {
            Ordering::Less => (&self.authenticators[count], &self.authenticators[last]),
            _ => (&self.authenticators[last], &self.authenticators[count]),
        };
        let mut accumulator =
            authenticator::<D>(left, &self.keys[last], &self.payloads[last], right);

        for index in (0..last).rev() {
            let (key_at, payload, sibling) = (
                &self.keys[index],
                &self.payloads[index],
                &self.authenticators[index],
            );
            accumulator = match key.cmp(key_at) {
                Ordering::Equal => return false,
                Ordering::Less => authenticator::<D>(&accumulator, key_at, payload, sibling),
                Ordering::Greater => authenticator::<D>(sibling, key_at, payload, &accumulator),
            };
        }

        accumulator == *target
    }
}

impl<D: Digest> Default for ExistenceProof<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Digest> Clone for ExistenceProof<D> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            payloads: self.payloads.clone(),
            authenticators: self.authenticators.clone(),
            found: self.found,
            _phantom: PhantomData,
        }
    }
}

impl<D: Digest> std::fmt::Debug for ExistenceProof<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExistenceProof")
            .field("found", &self.found)
            .field(
                "keys",
                &self.keys.iter().map(hex::encode).collect::<Vec<_>>(),
            )
            .field("authenticators", &self.authenticators)
            .finish()
    }
}

impl<D: Digest> PartialEq for ExistenceProof<D> {
    fn eq(&self, other: &Self) -> bool {
        self.found == other.found
            && self.keys == other.keys
            && self.payloads == other.payloads
            && self.authenticators == other.authenticators
    }
}

impl<D: Digest> Eq for ExistenceProof<D> {}

fn length(len: usize) -> Result<u32> {
    Ok(u32::try_from(len)?)
}

/// Layout: `found u8 | n u32 | n * (len u32, key, len u32, payload) | m u32 | m * hash`.
impl<D: Digest> ToBytes for ExistenceProof<D> {
    type Output = Vec<u8>;

    fn to_bytes(&self) -> Self::Output {
        // Lengths and counts were checked against u32 when the proof was built
        // or decoded.
        let mut record = Record::new();
        record.push_u8(self.found as u8);
        record.push_u32(self.keys.len() as u32);
        for (key, payload) in self.keys.iter().zip(&self.payloads) {
            record.push_u32(key.len() as u32);
            record.push(key);
            record.push_u32(payload.len() as u32);
            record.push(payload);
        }
        record.push_u32(self.authenticators.len() as u32);
        for authenticator in &self.authenticators {
            record.push(authenticator.as_ref());
        }
        record.into_vec()
    }
}

impl<D: Digest> FromBytes for ExistenceProof<D> {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record = Record::from(bytes);
        let mut proof = Self::new();

        proof.found = match record.get_u8(0)? {
            0 => false,
            1 => true,
            flag => {
                return Err(Error::Deserialization(format!(
                    "invalid found flag {}",
                    flag
                )))
            }
        };

        let mut pos = 1;
        let nodes = record.get_u32(pos)? as usize;
        pos += 4;
        for _ in 0..nodes {
            let len = record.get_u32(pos)? as usize;
            proof.keys.push(record.get(pos + 4, len)?.to_vec());
            pos += 4 + len;

            let len = record.get_u32(pos)? as usize;
            proof.payloads.push(record.get(pos + 4, len)?.to_vec());
            pos += 4 + len;
        }

        let authenticators = record.get_u32(pos)? as usize;
        pos += 4;
        for _ in 0..authenticators {
            proof
                .authenticators
                .push(Hash::from_bytes(record.get(pos, HASH_SIZE)?)?);
            pos += HASH_SIZE;
        }

        if pos != record.size() {
            return Err(Error::Deserialization(format!(
                "{} trailing bytes after proof",
                record.size() - pos
            )));
        }

        Ok(proof)
    }
}
