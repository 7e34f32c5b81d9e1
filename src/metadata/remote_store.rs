//! HTTP client for a metadata service running in another process

use crate::error::{Result, StoreError};
use crate::hash::ContentHash;
use crate::metadata::{
    AffinityResponse, CommitOutcome, CommitRequest, DeleteRequest, FileInfo, FileVersion, MetadataStorage,
};
use async_trait::async_trait;
use log::debug;
use reqwest::Url;
use serde::de::DeserializeOwned;

/// Metadata service reached over HTTP at `http://{address}/files`.
#[derive(Debug, Clone)]
pub struct RemoteMetadataStore {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteMetadataStore {
    /// `address` is `host:port`.
    pub fn new(address: &str) -> Self {
        Self::with_client(address, reqwest::Client::new())
    }

    pub fn with_client(address: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: format!("http://{}", address.trim_end_matches('/')),
            client,
        }
    }

    /// `base_url` extended by `segments`, each percent-encoded as one path segment.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let invalid = || StoreError::Config(format!("invalid metadata service address: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http(format!("{} failed: status={} body={}", what, status, body)));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MetadataStorage for RemoteMetadataStore {
    async fn read(&self, filename: &str) -> Result<FileVersion> {
        let response = self.client.get(self.url(&["files", filename])?).send().await?;
        Self::decode(response, "read").await
    }

    async fn commit(
        &self,
        filename: &str,
        version: u64,
        hash_list: Vec<ContentHash>,
        shard_hint: Option<usize>,
    ) -> Result<CommitOutcome> {
        debug!("Commit {} v{} ({} blocks) to {}", filename, version, hash_list.len(), self.base_url);
        let request = CommitRequest { version, hash_list, shard_hint };
        let response = self
            .client
            .post(self.url(&["files", filename, "commit"])?)
            .json(&request)
            .send()
            .await?;
        Self::decode(response, "commit").await
    }

    async fn delete(&self, filename: &str, version: u64) -> Result<CommitOutcome> {
        let response = self
            .client
            .post(self.url(&["files", filename, "delete"])?)
            .json(&DeleteRequest { version })
            .send()
            .await?;
        Self::decode(response, "delete").await
    }

    async fn affinity_shard(&self, filename: &str) -> Result<Option<usize>> {
        let response = self.client.get(self.url(&["files", filename, "affinity"])?).send().await?;
        let affinity: AffinityResponse = Self::decode(response, "affinity").await?;
        Ok(affinity.shard)
    }

    async fn list_files(&self) -> Result<Vec<FileInfo>> {
        let response = self.client.get(self.url(&["files"])?).send().await?;
        Self::decode(response, "list").await
    }
}
