//! In-memory implementation of the BlockStore trait

use crate::error::{Result, StoreError};
use crate::hash::ContentHash;
use crate::storage::BlockStore;
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Block store holding every block in process memory.
///
/// Contents live as long as the process. Writes to different keys never
/// contend beyond the map lock itself.
#[derive(Clone, Default)]
pub struct MemoryBlockStore {
    blocks: Arc<RwLock<HashMap<ContentHash, Bytes>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks held
    pub fn block_count(&self) -> usize {
        self.blocks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Total payload bytes held
    pub fn byte_count(&self) -> usize {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Bytes::len)
            .sum()
    }

    /// Whether a block is present, without going through the async trait.
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(hash)
    }

    /// Every hash currently held, sorted.
    pub fn hashes(&self) -> Vec<ContentHash> {
        let mut hashes: Vec<ContentHash> = self
            .blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        hashes.sort();
        hashes
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn store(&self, hash: &ContentHash, bytes: Bytes) -> Result<()> {
        debug!("Storing block {} ({} bytes)", hash.short(), bytes.len());
        self.blocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash.clone(), bytes);
        Ok(())
    }

    async fn get(&self, hash: &ContentHash) -> Result<Bytes> {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hash)
            .cloned()
            .ok_or_else(|| StoreError::BlockNotFound(hash.clone()))
    }

    async fn has(&self, hash: &ContentHash) -> Result<bool> {
        Ok(self.contains(hash))
    }
}
