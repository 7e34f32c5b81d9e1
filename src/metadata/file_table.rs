//! In-memory table of file records
//!
//! The table applies state transitions without checking them; the commit
//! protocol in `MetadataService` decides whether a transition is allowed.

use crate::hash::ContentHash;
use crate::metadata::{FileInfo, FileRecord, FileVersion};
use chrono::Utc;
use std::collections::HashMap;

/// Filename to record map. Records are never removed.
#[derive(Debug, Default)]
pub struct FileTable {
    records: HashMap<String, FileRecord>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filename: &str) -> Option<&FileRecord> {
        self.records.get(filename)
    }

    /// Version 0 for unknown files. Reading never creates a record.
    pub fn current_version(&self, filename: &str) -> u64 {
        self.records.get(filename).map_or(0, |record| record.version)
    }

    pub fn read(&self, filename: &str) -> FileVersion {
        self.records
            .get(filename)
            .map(FileVersion::from)
            .unwrap_or_else(FileVersion::absent)
    }

    /// Replace the block list, clear any tombstone and bump the version.
    pub fn commit(&mut self, filename: &str, hash_list: Vec<ContentHash>, pinned_shard: Option<usize>) -> u64 {
        let now = Utc::now();
        let record = self
            .records
            .entry(filename.to_string())
            .or_insert_with(|| FileRecord {
                version: 0,
                hash_list: Vec::new(),
                deleted: false,
                pinned_shard: None,
                updated_at: now,
            });
        record.version += 1;
        record.hash_list = hash_list;
        record.deleted = false;
        record.pinned_shard = pinned_shard;
        record.updated_at = now;
        record.version
    }

    /// Tombstone an existing record and bump its version.
    ///
    /// Returns `None` when the file has no record.
    pub fn tombstone(&mut self, filename: &str) -> Option<u64> {
        let record = self.records.get_mut(filename)?;
        record.version += 1;
        record.hash_list.clear();
        record.deleted = true;
        record.pinned_shard = None;
        record.updated_at = Utc::now();
        Some(record.version)
    }

    pub fn list(&self) -> Vec<FileInfo> {
        let mut files: Vec<FileInfo> = self
            .records
            .iter()
            .map(|(filename, record)| FileInfo {
                filename: filename.clone(),
                version: record.version,
                deleted: record.deleted,
                block_count: record.hash_list.len(),
                updated_at: record.updated_at,
            })
            .collect();
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        files
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(names: &[&str]) -> Vec<ContentHash> {
        names.iter().map(|n| ContentHash::of(n.as_bytes())).collect()
    }

    #[test]
    fn test_read_unknown_file_is_observational() {
        let table = FileTable::new();
        assert_eq!(table.read("ghost.txt"), FileVersion::absent());
        assert_eq!(table.read("ghost.txt"), FileVersion::absent());
        assert_eq!(table.current_version("ghost.txt"), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_commit_bumps_version_and_replaces_list() {
        let mut table = FileTable::new();
        assert_eq!(table.commit("a.txt", hashes(&["1", "2"]), None), 1);
        assert_eq!(table.commit("a.txt", hashes(&["3"]), None), 2);

        let version = table.read("a.txt");
        assert_eq!(version.version, 2);
        assert_eq!(version.hash_list, hashes(&["3"]));
    }

    #[test]
    fn test_tombstone_and_resurrect() {
        let mut table = FileTable::new();
        table.commit("a.txt", hashes(&["1"]), Some(1));
        assert_eq!(table.tombstone("a.txt"), Some(2));

        let record = table.get("a.txt").unwrap();
        assert!(record.deleted);
        assert!(record.hash_list.is_empty());
        assert_eq!(record.pinned_shard, None);
        assert_eq!(table.read("a.txt"), FileVersion { version: 2, hash_list: vec![], pinned_shard: None });

        assert_eq!(table.commit("a.txt", hashes(&["1"]), None), 3);
        assert!(!table.get("a.txt").unwrap().deleted);
    }

    #[test]
    fn test_tombstone_unknown_file() {
        let mut table = FileTable::new();
        assert_eq!(table.tombstone("ghost.txt"), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_list_sorted() {
        let mut table = FileTable::new();
        table.commit("b.txt", hashes(&["1", "2"]), None);
        table.commit("a.txt", hashes(&["1"]), None);
        table.tombstone("b.txt");

        let files = table.list();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].filename, "a.txt");
        assert_eq!(files[0].block_count, 1);
        assert_eq!(files[1].filename, "b.txt");
        assert!(files[1].deleted);
        assert_eq!(files[1].version, 2);
        assert_eq!(files[1].block_count, 0);
    }
}
