//! Metadata service: the version-checked commit protocol
//!
//! Commits and deletes are serialized through one server-wide gate, so each
//! one observes a stable current version and nothing can change the record
//! between the durability probes and the mutation. Reads only take the
//! record-table lock, which is never held across a remote call.

use crate::error::{Result, StoreError};
use crate::hash::ContentHash;
use crate::metadata::file_table::FileTable;
use crate::metadata::{CommitOutcome, FileInfo, FileVersion, MetadataStorage};
use crate::storage::ShardSet;
use async_trait::async_trait;
use futures::future::try_join_all;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;

/// Owns every file record and probes the block shards before accepting a commit.
pub struct MetadataService {
    shards: ShardSet,
    table: RwLock<FileTable>,
    commit_gate: Mutex<()>,
}

impl MetadataService {
    pub fn new(shards: ShardSet) -> Self {
        Self {
            shards,
            table: RwLock::new(FileTable::new()),
            commit_gate: Mutex::new(()),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn table(&self) -> RwLockReadGuard<'_, FileTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn table_mut(&self) -> RwLockWriteGuard<'_, FileTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hashes of `hash_list` absent from their target shard, in first-seen order.
    ///
    /// Probes run concurrently; each distinct hash is probed once.
    async fn missing_blocks(&self, hash_list: &[ContentHash], shard_hint: Option<usize>) -> Result<Vec<ContentHash>> {
        let mut seen = HashSet::new();
        let unique: Vec<&ContentHash> = hash_list.iter().filter(|hash| seen.insert(*hash)).collect();

        let probes = unique.into_iter().map(|hash| async move {
            let present = self.shards.target(hash, shard_hint)?.has(hash).await?;
            Ok::<_, StoreError>((hash, present))
        });

        Ok(try_join_all(probes)
            .await?
            .into_iter()
            .filter(|(_, present)| !present)
            .map(|(hash, _)| hash.clone())
            .collect())
    }
}

#[async_trait]
impl MetadataStorage for MetadataService {
    async fn read(&self, filename: &str) -> Result<FileVersion> {
        Ok(self.table().read(filename))
    }

    async fn commit(
        &self,
        filename: &str,
        version: u64,
        hash_list: Vec<ContentHash>,
        shard_hint: Option<usize>,
    ) -> Result<CommitOutcome> {
        if let Some(index) = shard_hint {
            self.shards.shard(index)?;
        }

        let _gate = self.commit_gate.lock().await;
        let current_version = self.table().current_version(filename);

        // An unknown file proposed at version 1 passes this check and is created
        // below if its blocks are already present, adopting blocks pushed by others.
        if version != current_version + 1 {
            warn!(
                "Rejecting commit of {} at v{}: current version is {}",
                filename, version, current_version
            );
            return Ok(CommitOutcome::VersionConflict { current_version });
        }

        let missing = self.missing_blocks(&hash_list, shard_hint).await?;
        if !missing.is_empty() {
            debug!(
                "Commit of {} v{} is missing {} of {} block(s)",
                filename,
                version,
                missing.len(),
                hash_list.len()
            );
            return Ok(CommitOutcome::MissingBlocks { hashes: missing });
        }

        let new_version = self.table_mut().commit(filename, hash_list.clone(), shard_hint);
        info!("Committed {} v{} with {} block(s)", filename, new_version, hash_list.len());
        Ok(CommitOutcome::Committed { version: new_version, hash_list })
    }

    async fn delete(&self, filename: &str, version: u64) -> Result<CommitOutcome> {
        let _gate = self.commit_gate.lock().await;
        let mut table = self.table_mut();

        let (current_version, deleted) = match table.get(filename) {
            None => {
                debug!("Delete of unknown file {} is a no-op", filename);
                return Ok(CommitOutcome::Committed { version: 0, hash_list: Vec::new() });
            }
            Some(record) => (record.version, record.deleted),
        };

        // Deleting a tombstone is absorbing: it bumps the version whatever the caller proposed.
        if !deleted && version != current_version + 1 {
            warn!(
                "Rejecting delete of {} at v{}: current version is {}",
                filename, version, current_version
            );
            return Ok(CommitOutcome::VersionConflict { current_version });
        }

        let new_version = table.tombstone(filename).unwrap_or(current_version);
        info!("Deleted {} at v{}", filename, new_version);
        Ok(CommitOutcome::Committed { version: new_version, hash_list: Vec::new() })
    }

    async fn affinity_shard(&self, filename: &str) -> Result<Option<usize>> {
        Ok(self.table().get(filename).and_then(|record| record.pinned_shard))
    }

    async fn list_files(&self) -> Result<Vec<FileInfo>> {
        Ok(self.table().list())
    }
}
