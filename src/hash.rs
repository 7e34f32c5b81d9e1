//! Content addressing: SHA-256 block hashes and fixed-size chunking.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Default block size used by the client when splitting files.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Hex length of a SHA-256 digest.
const HASH_HEX_LEN: usize = 64;

/// Lowercase hex SHA-256 digest of a block's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash the given bytes.
    pub fn of(data: &[u8]) -> Self {
        ContentHash(hex::encode(Sha256::digest(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HASH_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidHash(s.to_string()));
        }
        Ok(ContentHash(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// A block of file content together with its address.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub hash: ContentHash,
    pub bytes: Bytes,
}

impl Block {
    pub fn new(bytes: Bytes) -> Self {
        Self { hash: ContentHash::of(&bytes), bytes }
    }
}

/// Split `data` into consecutive `block_size` blocks in file order.
///
/// The last block may be short; empty input yields no blocks. Blocks share the
/// input buffer rather than copying it.
pub fn split_blocks(data: Bytes, block_size: usize) -> Vec<Block> {
    assert!(block_size > 0, "block size must be non-zero");
    let mut blocks = Vec::with_capacity(data.len().div_ceil(block_size));
    let mut start = 0;
    while start < data.len() {
        let end = usize::min(start + block_size, data.len());
        blocks.push(Block::new(data.slice(start..end)));
        start = end;
    }
    blocks
}
