//! Metadata Storage Layer Abstraction
//!
//! The metadata service maps each filename to a monotonically increasing
//! version and an ordered list of block hashes (or a tombstone). This module
//! holds the record types, the wire shapes shared by the HTTP handlers and the
//! remote client, and the [`MetadataStorage`] trait the client talks to.

pub mod file_table;
pub mod remote_store;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hash::ContentHash;

/// Stored state of one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    /// Number of accepted commits and deletes so far
    pub version: u64,
    /// Block hashes in file order; empty while tombstoned
    pub hash_list: Vec<ContentHash>,
    /// Tombstone flag
    pub deleted: bool,
    /// Shard every block was placed on, for files committed in affinity mode
    pub pinned_shard: Option<usize>,
    /// Time of the last accepted commit or delete
    pub updated_at: DateTime<Utc>,
}

/// What `read` returns: the current version and, unless tombstoned, its blocks.
///
/// `pinned_shard` comes from the same record as `hash_list`, so a reader
/// always fetches a version's blocks from the shard that version was committed to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileVersion {
    pub version: u64,
    pub hash_list: Vec<ContentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_shard: Option<usize>,
}

impl FileVersion {
    /// Version of a filename the service has never seen.
    pub fn absent() -> Self {
        Self::default()
    }
}

impl From<&FileRecord> for FileVersion {
    fn from(record: &FileRecord) -> Self {
        if record.deleted {
            return Self { version: record.version, hash_list: Vec::new(), pinned_shard: None };
        }
        Self {
            version: record.version,
            hash_list: record.hash_list.clone(),
            pinned_shard: record.pinned_shard,
        }
    }
}

/// Listing entry for one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    pub filename: String,
    pub version: u64,
    pub deleted: bool,
    pub block_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Result of a commit or delete attempt.
///
/// Only `Committed` changes state; the other variants leave the record exactly
/// as it was and tell the caller how to retry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed { version: u64, hash_list: Vec<ContentHash> },
    VersionConflict { current_version: u64 },
    MissingBlocks { hashes: Vec<ContentHash> },
}

/// Body of `POST /files/{name}/commit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitRequest {
    pub version: u64,
    pub hash_list: Vec<ContentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_hint: Option<usize>,
}

/// Body of `POST /files/{name}/delete`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteRequest {
    pub version: u64,
}

/// Response of `GET /files/{name}/affinity`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AffinityResponse {
    pub shard: Option<usize>,
}

/// Trait defining the metadata service interface
#[async_trait]
pub trait MetadataStorage: Send + Sync {
    /// Current version and block list; `(0, [])` for unknown files.
    async fn read(&self, filename: &str) -> Result<FileVersion>;

    /// Record `hash_list` as version `version` of `filename`.
    async fn commit(
        &self,
        filename: &str,
        version: u64,
        hash_list: Vec<ContentHash>,
        shard_hint: Option<usize>,
    ) -> Result<CommitOutcome>;

    /// Tombstone `filename` at version `version`.
    async fn delete(&self, filename: &str, version: u64) -> Result<CommitOutcome>;

    /// Shard the file's blocks were pinned to by an affinity-mode commit.
    async fn affinity_shard(&self, filename: &str) -> Result<Option<usize>>;

    /// Every recorded file, sorted by name.
    async fn list_files(&self) -> Result<Vec<FileInfo>>;
}
