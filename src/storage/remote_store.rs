//! HTTP client for a block service running in another process

use crate::error::{Result, StoreError};
use crate::hash::ContentHash;
use crate::storage::BlockStore;
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use reqwest::StatusCode;

/// Block store reached over HTTP at `http://{address}/blocks/{hash}`.
#[derive(Debug, Clone)]
pub struct RemoteBlockStore {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteBlockStore {
    /// `address` is `host:port`.
    pub fn new(address: &str) -> Self {
        Self::with_client(address, reqwest::Client::new())
    }

    /// Share one connection pool across several shards.
    pub fn with_client(address: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: format!("http://{}", address.trim_end_matches('/')),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn block_url(&self, hash: &ContentHash) -> String {
        format!("{}/blocks/{}", self.base_url, hash)
    }
}

#[async_trait]
impl BlockStore for RemoteBlockStore {
    async fn store(&self, hash: &ContentHash, bytes: Bytes) -> Result<()> {
        debug!("PUT block {} to {}", hash.short(), self.base_url);
        let response = self
            .client
            .put(self.block_url(hash))
            .header("content-type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::Http(format!(
                "store block {} failed: status={}",
                hash,
                response.status()
            )));
        }
        Ok(())
    }

    async fn get(&self, hash: &ContentHash) -> Result<Bytes> {
        let response = self.client.get(self.block_url(hash)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::BlockNotFound(hash.clone())),
            status if status.is_success() => Ok(response.bytes().await?),
            status => Err(StoreError::Http(format!(
                "get block {} failed: status={}",
                hash, status
            ))),
        }
    }

    async fn has(&self, hash: &ContentHash) -> Result<bool> {
        let response = self.client.head(self.block_url(hash)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(StoreError::Http(format!(
                "probe block {} failed: status={}",
                hash, status
            ))),
        }
    }
}
