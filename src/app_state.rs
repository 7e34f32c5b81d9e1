//! Application State Management
//!
//! This module provides the application state that contains all services
//! and their dependencies, following the dependency injection pattern.

use std::sync::Arc;
use log::info;

use crate::client::Client;
use crate::config::AppConfig;
use crate::error::Result;
use crate::metadata::MetadataStorage;
use crate::metadata::remote_store::RemoteMetadataStore;
use crate::service::metadata_service::MetadataService;
use crate::storage::memory_store::MemoryBlockStore;
use crate::storage::remote_store::RemoteBlockStore;
use crate::storage::{BlockStore, ShardSet};

/// State of a block service process
#[derive(Clone)]
pub struct BlockAppState {
    pub store: Arc<dyn BlockStore>,
}

impl BlockAppState {
    /// Create a block service backed by process memory
    pub fn new() -> Self {
        info!("Initializing in-memory block store");
        Self::with_store(Arc::new(MemoryBlockStore::new()))
    }

    pub fn with_store(store: Arc<dyn BlockStore>) -> Self {
        Self { store }
    }
}

impl Default for BlockAppState {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a metadata service process
#[derive(Clone)]
pub struct MetadataAppState {
    pub service: Arc<dyn MetadataStorage>,
}

impl MetadataAppState {
    /// Create the metadata service, reaching the configured block stores over HTTP
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let shards = remote_shards(config)?;
        info!("Initializing metadata service over {} block store(s)", shards.len());
        Ok(Self::with_shards(shards))
    }

    pub fn with_shards(shards: ShardSet) -> Self {
        Self {
            service: Arc::new(MetadataService::new(shards)),
        }
    }

    /// Create application state for testing with in-memory block stores
    pub fn new_for_testing(shard_count: usize) -> Result<(Self, Vec<MemoryBlockStore>)> {
        let stores: Vec<MemoryBlockStore> = (0..shard_count).map(|_| MemoryBlockStore::new()).collect();
        let shards = stores
            .iter()
            .map(|store| Arc::new(store.clone()) as Arc<dyn BlockStore>)
            .collect();
        Ok((Self::with_shards(ShardSet::new(shards)?), stores))
    }
}

/// Remote block stores in configured order, sharing one connection pool
pub fn remote_shards(config: &AppConfig) -> Result<ShardSet> {
    let http = reqwest::Client::new();
    let shards = config
        .block_stores
        .iter()
        .map(|endpoint| {
            Arc::new(RemoteBlockStore::with_client(&endpoint.address(), http.clone())) as Arc<dyn BlockStore>
        })
        .collect();
    ShardSet::new(shards)
}

/// Client talking to the configured metadata service and block stores
pub fn build_client(config: &AppConfig) -> Result<Client> {
    config.validate()?;
    let metadata = Arc::new(RemoteMetadataStore::new(&config.metadata.address()));
    Client::new(metadata, remote_shards(config)?, config.client_options())
}
