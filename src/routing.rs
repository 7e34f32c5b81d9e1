//! Shard routing shared by the client and the metadata service.
//!
//! Both sides must agree on where a block lives, so placement is computed in
//! exactly one place: [`route`].

use crate::hash::ContentHash;

/// Home shard of `hash`: the hash read as a big-endian integer, modulo
/// `shard_count`.
pub fn route(hash: &ContentHash, shard_count: usize) -> usize {
    assert!(shard_count > 0, "shard count must be non-zero");
    let modulus = shard_count as u128;
    let rem = hash.as_str().bytes().fold(0u128, |acc, digit| {
        let value = (digit as char).to_digit(16).unwrap_or(0) as u128;
        (acc * 16 + value) % modulus
    });
    rem as usize
}

/// How a client session places blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingMode {
    /// Each block goes to its home shard from [`route`].
    #[default]
    Hash,
    /// Every block of the session goes to one pre-selected shard.
    Affinity(usize),
}

impl RoutingMode {
    /// Shard a block should be pushed to under this mode.
    pub fn shard_for(&self, hash: &ContentHash, shard_count: usize) -> usize {
        match self {
            RoutingMode::Hash => route(hash, shard_count),
            RoutingMode::Affinity(index) => *index,
        }
    }

    /// Hint passed along with commits so the metadata service probes the same shard.
    pub fn shard_hint(&self) -> Option<usize> {
        match self {
            RoutingMode::Hash => None,
            RoutingMode::Affinity(index) => Some(*index),
        }
    }
}
