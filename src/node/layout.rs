//! Physical layout of a node record.
//!
//! ```text
//! | key_len u16 | left_count u16 | right_count u16 | auth_count u16 | value_count u16 |
//! | priority [u8; 32] | modified u8 | key bytes |
//! | left history  : left_count  * (snapshot u64, node u64)         |
//! | right history : right_count * (snapshot u64, node u64)         |
//! | auth history  : auth_count  * policy-defined fixed-size entry  |
//! | value history : value_count * (snapshot u64, len u16, bytes)   |
//! ```
//!
//! Every history is ordered newest snapshot first. Integers are big-endian.

use crate::hash::HASH_SIZE;

pub(crate) const KEY_LEN: usize = 0;
pub(crate) const LEFT_COUNT: usize = 2;
pub(crate) const RIGHT_COUNT: usize = 4;
pub(crate) const AUTH_COUNT: usize = 6;
pub(crate) const VALUE_COUNT: usize = 8;
pub(crate) const PRIORITY: usize = 10;
pub(crate) const MODIFIED: usize = PRIORITY + HASH_SIZE;
pub(crate) const HEADER_SIZE: usize = MODIFIED + 1;

pub(crate) const CHILD_ENTRY_SIZE: usize = 16;
pub(crate) const VALUE_ENTRY_HEADER: usize = 10;

/// Size of a freshly created node: one entry per child pointer, one value
/// entry and no cached authenticator.
pub fn fresh_size(key_len: usize, value_len: usize) -> usize {
    HEADER_SIZE + key_len + 2 * CHILD_ENTRY_SIZE + VALUE_ENTRY_HEADER + value_len
}
