//! Block Storage Layer Abstraction
//!
//! A block store is a keyed store of opaque byte blocks addressed by content
//! hash. It knows nothing about files or versions. One store backs one shard;
//! [`ShardSet`] holds the ordered list of shards the client and the metadata
//! service both route against.

pub mod memory_store;
pub mod remote_store;


use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::hash::ContentHash;
use crate::routing::route;

/// Trait defining the block storage interface
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Store a block. Storing an existing hash again overwrites it.
    async fn store(&self, hash: &ContentHash, bytes: Bytes) -> Result<()>;

    /// Fetch a block, failing with `BlockNotFound` if absent.
    async fn get(&self, hash: &ContentHash) -> Result<Bytes>;

    /// Whether a block is present.
    async fn has(&self, hash: &ContentHash) -> Result<bool>;
}

/// Ordered block-store shards; position in the list is the shard index.
#[derive(Clone)]
pub struct ShardSet {
    shards: Vec<Arc<dyn BlockStore>>,
}

impl ShardSet {
    pub fn new(shards: Vec<Arc<dyn BlockStore>>) -> Result<Self> {
        if shards.is_empty() {
            return Err(StoreError::Config("at least one block store is required".to_string()));
        }
        Ok(Self { shards })
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Shard at `index`, or `InvalidShard` when out of range.
    pub fn shard(&self, index: usize) -> Result<&Arc<dyn BlockStore>> {
        self.shards.get(index).ok_or(StoreError::InvalidShard {
            index,
            shard_count: self.shards.len(),
        })
    }

    /// Home shard index of `hash`.
    pub fn route(&self, hash: &ContentHash) -> usize {
        route(hash, self.shards.len())
    }

    /// Shard that must hold `hash`: the hinted shard when given, the home shard otherwise.
    pub fn target(&self, hash: &ContentHash, shard_hint: Option<usize>) -> Result<&Arc<dyn BlockStore>> {
        self.shard(shard_hint.unwrap_or_else(|| self.route(hash)))
    }
}
