//! Client side of the protocol: upload, download and delete.
//!
//! The client splits files into fixed-size blocks, offers the block list to the
//! metadata service and reacts to the outcome: it pushes whatever blocks the
//! service reports missing, or moves its proposed version past the one the
//! service reports as current, and tries again. Version conflicts and missing
//! blocks never escape these loops; callers see a report or a terminal
//! [`StoreError`].

pub mod retry;

use bytes::Bytes;
use futures::future::try_join_all;
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::hash::{split_blocks, ContentHash, DEFAULT_BLOCK_SIZE};
use crate::metadata::{CommitOutcome, FileInfo, MetadataStorage};
use crate::routing::RoutingMode;
use crate::storage::ShardSet;
use retry::{Attempts, RetryPolicy};

/// Tunables for a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub block_size: usize,
    pub routing: RoutingMode,
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            routing: RoutingMode::Hash,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub filename: String,
    pub version: u64,
    pub block_count: usize,
    /// Blocks this upload had to push because the service lacked them
    pub pushed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub filename: String,
    pub version: u64,
    pub path: PathBuf,
    pub bytes_written: usize,
    /// Blocks fetched from block stores rather than found locally
    pub fetched: usize,
}

/// Per-operation block cache keyed by content hash.
type BlockCache = HashMap<ContentHash, Bytes>;

pub struct Client {
    metadata: Arc<dyn MetadataStorage>,
    shards: ShardSet,
    options: ClientOptions,
}

impl Client {
    pub fn new(metadata: Arc<dyn MetadataStorage>, shards: ShardSet, options: ClientOptions) -> Result<Self> {
        if options.block_size == 0 {
            return Err(StoreError::Config("block size must be non-zero".to_string()));
        }
        if let RoutingMode::Affinity(index) = options.routing {
            shards.shard(index)?;
        }
        Ok(Self { metadata, shards, options })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Upload the file at `path` under its base name.
    pub async fn upload(&self, path: impl AsRef<Path>) -> Result<UploadReport> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StoreError::LocalFileNotFound(path.to_path_buf()))?
            .to_string();

        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::LocalFileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let blocks = split_blocks(Bytes::from(data), self.options.block_size);
        let hash_list: Vec<ContentHash> = blocks.iter().map(|block| block.hash.clone()).collect();
        let cache: BlockCache = blocks.into_iter().map(|block| (block.hash, block.bytes)).collect();
        debug!("Split {} into {} block(s)", filename, hash_list.len());

        let shard_hint = self.options.routing.shard_hint();
        let mut version = self.metadata.read(&filename).await?.version + 1;
        let mut attempts = Attempts::new(self.options.retry, format!("upload {}", filename));
        let mut pushed = 0;

        loop {
            attempts.begin()?;
            match self.metadata.commit(&filename, version, hash_list.clone(), shard_hint).await? {
                CommitOutcome::Committed { version, .. } => {
                    info!(
                        "Uploaded {} as v{} ({} block(s), {} pushed, {} attempt(s))",
                        filename,
                        version,
                        hash_list.len(),
                        pushed,
                        attempts.made()
                    );
                    return Ok(UploadReport { filename, version, block_count: hash_list.len(), pushed });
                }
                CommitOutcome::MissingBlocks { hashes } => {
                    debug!("{} block(s) of {} missing, pushing", hashes.len(), filename);
                    pushed += self.push_blocks(&hashes, &cache).await?;
                }
                CommitOutcome::VersionConflict { current_version } => {
                    warn!(
                        "Version conflict uploading {} at v{}, service is at v{}",
                        filename, version, current_version
                    );
                    version = current_version + 1;
                    attempts.backoff().await;
                }
            }
        }
    }

    /// Push the named blocks from `cache` to the shards the routing mode selects.
    async fn push_blocks(&self, hashes: &[ContentHash], cache: &BlockCache) -> Result<usize> {
        let pushes = hashes.iter().map(|hash| async move {
            let bytes = cache
                .get(hash)
                .cloned()
                .ok_or_else(|| StoreError::BlockNotFound(hash.clone()))?;
            let index = self.options.routing.shard_for(hash, self.shards.len());
            self.shards.shard(index)?.store(hash, bytes).await
        });
        try_join_all(pushes).await?;
        Ok(hashes.len())
    }

    /// Download `filename` into the directory `destination`.
    ///
    /// Blocks already present in files inside `destination` are reused instead
    /// of being fetched.
    pub async fn download(&self, filename: &str, destination: impl AsRef<Path>) -> Result<DownloadReport> {
        let destination = destination.as_ref();
        let current = self.metadata.read(filename).await?;
        if current.hash_list.is_empty() {
            return Err(StoreError::RemoteFileNotFound(filename.to_string()));
        }

        let mut cache = seed_cache(destination, self.options.block_size).await?;
        let mut wanted = HashSet::new();
        let to_fetch: Vec<&ContentHash> = current
            .hash_list
            .iter()
            .filter(|hash| !cache.contains_key(*hash) && wanted.insert(*hash))
            .collect();

        let pinned = current.pinned_shard;
        let fetches = to_fetch.iter().map(|hash| async move {
            let bytes = self.shards.target(hash, pinned)?.get(hash).await?;
            Ok::<_, StoreError>(((*hash).clone(), bytes))
        });
        let fetched = try_join_all(fetches).await?;
        let fetched_count = fetched.len();
        cache.extend(fetched);

        let mut content = Vec::new();
        for hash in &current.hash_list {
            let bytes = cache.get(hash).ok_or_else(|| StoreError::BlockNotFound(hash.clone()))?;
            content.extend_from_slice(bytes);
        }

        tokio::fs::create_dir_all(destination).await?;
        let path = destination.join(filename);
        tokio::fs::write(&path, &content).await?;

        info!(
            "Downloaded {} v{} to {} ({} bytes, {} block(s) fetched)",
            filename,
            current.version,
            path.display(),
            content.len(),
            fetched_count
        );
        Ok(DownloadReport {
            filename: filename.to_string(),
            version: current.version,
            path,
            bytes_written: content.len(),
            fetched: fetched_count,
        })
    }

    /// Tombstone `filename`, returning the version of the tombstone.
    pub async fn delete(&self, filename: &str) -> Result<u64> {
        let mut version = self.metadata.read(filename).await?.version + 1;
        let mut attempts = Attempts::new(self.options.retry, format!("delete {}", filename));

        loop {
            attempts.begin()?;
            match self.metadata.delete(filename, version).await? {
                CommitOutcome::Committed { version: 0, .. } => {
                    return Err(StoreError::RemoteFileNotFound(filename.to_string()));
                }
                CommitOutcome::Committed { version, .. } => {
                    info!("Deleted {} at v{}", filename, version);
                    return Ok(version);
                }
                CommitOutcome::VersionConflict { current_version } => {
                    warn!(
                        "Version conflict deleting {} at v{}, service is at v{}",
                        filename, version, current_version
                    );
                    version = current_version + 1;
                    attempts.backoff().await;
                }
                CommitOutcome::MissingBlocks { hashes } => {
                    error!("Unexpected missing-blocks outcome deleting {}", filename);
                    return Err(StoreError::UnexpectedOutcome(format!(
                        "delete of {} answered with {} missing block(s)",
                        filename,
                        hashes.len()
                    )));
                }
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<FileInfo>> {
        self.metadata.list_files().await
    }
}

/// Blocks of the regular files already in `directory`.
async fn seed_cache(directory: &Path, block_size: usize) -> Result<BlockCache> {
    let mut cache = BlockCache::new();
    let mut entries = match tokio::fs::read_dir(directory).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(cache),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        match tokio::fs::read(entry.path()).await {
            Ok(data) => {
                for block in split_blocks(Bytes::from(data), block_size) {
                    cache.insert(block.hash, block.bytes);
                }
            }
            Err(e) => warn!("Skipping unreadable {}: {}", entry.path().display(), e),
        }
    }
    debug!("Seeded {} block(s) from {}", cache.len(), directory.display());
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::metadata_service::MetadataService;
    use crate::storage::memory_store::MemoryBlockStore;
    use crate::storage::BlockStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn local_setup(shard_count: usize) -> (Client, Arc<MetadataService>, Vec<MemoryBlockStore>) {
        let stores: Vec<MemoryBlockStore> = (0..shard_count).map(|_| MemoryBlockStore::new()).collect();
        let shards = ShardSet::new(
            stores.iter().map(|s| Arc::new(s.clone()) as Arc<dyn BlockStore>).collect(),
        )
        .unwrap();
        let service = Arc::new(MetadataService::new(shards.clone()));
        let client = Client::new(service.clone(), shards, ClientOptions::default()).unwrap();
        (client, service, stores)
    }

    /// Metadata stub that answers every commit with a conflict.
    struct AlwaysConflicting {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl MetadataStorage for AlwaysConflicting {
        async fn read(&self, _filename: &str) -> Result<crate::metadata::FileVersion> {
            Ok(crate::metadata::FileVersion::absent())
        }

        async fn commit(&self, _: &str, _: u64, _: Vec<ContentHash>, _: Option<usize>) -> Result<CommitOutcome> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            Ok(CommitOutcome::VersionConflict { current_version: *calls as u64 * 10 })
        }

        async fn delete(&self, _: &str, _: u64) -> Result<CommitOutcome> {
            Ok(CommitOutcome::VersionConflict { current_version: 1 })
        }

        async fn affinity_shard(&self, _: &str) -> Result<Option<usize>> {
            Ok(None)
        }

        async fn list_files(&self) -> Result<Vec<FileInfo>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_upload_missing_local_file() {
        let (client, _, _) = local_setup(1);
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.bin");

        match client.upload(&missing).await {
            Err(StoreError::LocalFileNotFound(path)) => assert_eq!(path, missing),
            other => panic!("expected LocalFileNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_pushes_then_reuses() {
        let (client, _, stores) = local_setup(2);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, vec![42u8; 5000]).await.unwrap();

        let report = client.upload(&path).await.unwrap();
        assert_eq!(report.version, 1);
        assert_eq!(report.block_count, 2);
        assert_eq!(report.pushed, 2);

        let report = client.upload(&path).await.unwrap();
        assert_eq!(report.version, 2);
        assert_eq!(report.pushed, 0);

        let total: usize = stores.iter().map(MemoryBlockStore::block_count).sum();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_download_absent_file() {
        let (client, _, _) = local_setup(1);
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            client.download("ghost.txt", dir.path()).await,
            Err(StoreError::RemoteFileNotFound(name)) if name == "ghost.txt"
        ));
    }

    #[tokio::test]
    async fn test_download_reuses_local_blocks() {
        let (client, _, _) = local_setup(2);
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        let content: Vec<u8> = (0..12288u32).map(|i| (i % 199) as u8).collect();
        let path = src.path().join("doc.bin");
        tokio::fs::write(&path, &content).await.unwrap();
        client.upload(&path).await.unwrap();

        // A local copy of the first two blocks already sits in the destination.
        tokio::fs::write(dst.path().join("partial.bin"), &content[..8192]).await.unwrap();

        let report = client.download("doc.bin", dst.path()).await.unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.bytes_written, content.len());
        assert_eq!(tokio::fs::read(dst.path().join("doc.bin")).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_delete_absent_file() {
        let (client, _, _) = local_setup(1);
        assert!(matches!(
            client.delete("ghost.txt").await,
            Err(StoreError::RemoteFileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bounded_retries_terminate() {
        let shards = ShardSet::new(vec![Arc::new(MemoryBlockStore::new()) as Arc<dyn BlockStore>]).unwrap();
        let metadata = Arc::new(AlwaysConflicting { calls: Mutex::new(0) });
        let options = ClientOptions { retry: RetryPolicy::attempts(3), ..ClientOptions::default() };
        let client = Client::new(metadata.clone(), shards, options).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        tokio::fs::write(&path, b"abc").await.unwrap();

        match client.upload(&path).await {
            Err(StoreError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(*metadata.calls.lock().unwrap(), 3);
        assert!(matches!(client.delete("a.txt").await, Err(StoreError::RetriesExhausted { .. })));
    }

    /// Metadata wrapper that commits a new version pinned to another shard
    /// right after handing out the current one.
    struct RepinnedAfterRead {
        inner: Arc<MetadataService>,
        other_shard: usize,
        other_store: MemoryBlockStore,
        fired: Mutex<bool>,
    }

    #[async_trait]
    impl MetadataStorage for RepinnedAfterRead {
        async fn read(&self, filename: &str) -> Result<crate::metadata::FileVersion> {
            let current = self.inner.read(filename).await?;
            let fire = !std::mem::replace(&mut *self.fired.lock().unwrap(), true);
            if fire {
                let bytes = Bytes::from_static(b"newer content");
                let hash = ContentHash::of(&bytes);
                self.other_store.store(&hash, bytes).await?;
                let outcome = self
                    .inner
                    .commit(filename, current.version + 1, vec![hash], Some(self.other_shard))
                    .await?;
                assert!(matches!(outcome, CommitOutcome::Committed { .. }));
            }
            Ok(current)
        }

        async fn commit(&self, f: &str, v: u64, h: Vec<ContentHash>, hint: Option<usize>) -> Result<CommitOutcome> {
            self.inner.commit(f, v, h, hint).await
        }

        async fn delete(&self, f: &str, v: u64) -> Result<CommitOutcome> {
            self.inner.delete(f, v).await
        }

        async fn affinity_shard(&self, f: &str) -> Result<Option<usize>> {
            self.inner.affinity_shard(f).await
        }

        async fn list_files(&self) -> Result<Vec<FileInfo>> {
            self.inner.list_files().await
        }
    }

    #[tokio::test]
    async fn test_download_uses_shard_of_the_version_it_read() {
        let stores: Vec<MemoryBlockStore> = (0..3).map(|_| MemoryBlockStore::new()).collect();
        let shards = ShardSet::new(
            stores.iter().map(|s| Arc::new(s.clone()) as Arc<dyn BlockStore>).collect(),
        )
        .unwrap();
        let service = Arc::new(MetadataService::new(shards.clone()));

        let writer_options = ClientOptions { routing: RoutingMode::Affinity(1), ..ClientOptions::default() };
        let writer = Client::new(service.clone(), shards.clone(), writer_options).unwrap();
        let src = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..9000u32).map(|i| (i % 241) as u8).collect();
        let path = src.path().join("moving.bin");
        tokio::fs::write(&path, &content).await.unwrap();
        writer.upload(&path).await.unwrap();

        let racing = Arc::new(RepinnedAfterRead {
            inner: service.clone(),
            other_shard: 2,
            other_store: stores[2].clone(),
            fired: Mutex::new(false),
        });
        let reader = Client::new(racing, shards, ClientOptions::default()).unwrap();
        let dst = tempfile::tempdir().unwrap();

        let report = reader.download("moving.bin", dst.path()).await.unwrap();
        assert_eq!(report.version, 1);
        assert_eq!(tokio::fs::read(dst.path().join("moving.bin")).await.unwrap(), content);
        assert_eq!(service.affinity_shard("moving.bin").await.unwrap(), Some(2));
    }

    /// Metadata stub whose delete replies with an outcome deletes never produce.
    struct MissingOnDelete;

    #[async_trait]
    impl MetadataStorage for MissingOnDelete {
        async fn read(&self, _filename: &str) -> Result<crate::metadata::FileVersion> {
            Ok(crate::metadata::FileVersion { version: 1, ..Default::default() })
        }

        async fn commit(&self, _: &str, _: u64, _: Vec<ContentHash>, _: Option<usize>) -> Result<CommitOutcome> {
            Ok(CommitOutcome::Committed { version: 1, hash_list: Vec::new() })
        }

        async fn delete(&self, _: &str, _: u64) -> Result<CommitOutcome> {
            Ok(CommitOutcome::MissingBlocks { hashes: vec![ContentHash::of(b"x")] })
        }

        async fn affinity_shard(&self, _: &str) -> Result<Option<usize>> {
            Ok(None)
        }

        async fn list_files(&self) -> Result<Vec<FileInfo>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_delete_rejects_unexpected_outcome() {
        let shards = ShardSet::new(vec![Arc::new(MemoryBlockStore::new()) as Arc<dyn BlockStore>]).unwrap();
        let client = Client::new(Arc::new(MissingOnDelete), shards, ClientOptions::default()).unwrap();
        assert!(matches!(
            client.delete("a.txt").await,
            Err(StoreError::UnexpectedOutcome(message)) if message.contains("1 missing block")
        ));
    }

    #[test]
    fn test_invalid_options() {
        let shards = ShardSet::new(vec![Arc::new(MemoryBlockStore::new()) as Arc<dyn BlockStore>]).unwrap();
        let metadata = Arc::new(MetadataService::new(shards.clone()));

        let zero = ClientOptions { block_size: 0, ..ClientOptions::default() };
        assert!(matches!(Client::new(metadata.clone(), shards.clone(), zero), Err(StoreError::Config(_))));

        let pinned = ClientOptions { routing: RoutingMode::Affinity(1), ..ClientOptions::default() };
        assert!(matches!(Client::new(metadata, shards, pinned), Err(StoreError::InvalidShard { .. })));
    }
}
