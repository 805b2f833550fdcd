//! Cache snapshots and the durable backup store
//!
//! `CacheSnapshot` is one parse of the source cache. `BackupStore` is the
//! merged superset of every snapshot ever applied; it is what queries read.

use super::meeting::{MeetingNotes, MeetingRecord, TranscriptRecord};
use crate::error::ParseReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current on-disk backup format version
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Canonical result of parsing one read of the source cache
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub meetings: BTreeMap<String, MeetingRecord>,
    pub transcripts: BTreeMap<String, TranscriptRecord>,
    pub notes: BTreeMap<String, MeetingNotes>,
    /// Entries skipped while parsing
    pub report: ParseReport,
}

impl CacheSnapshot {
    pub fn meeting_count(&self) -> usize {
        self.meetings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meetings.is_empty() && self.transcripts.is_empty() && self.notes.is_empty()
    }
}

/// Merged meeting data keyed by meeting id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStore {
    #[serde(default)]
    pub meetings: BTreeMap<String, MeetingRecord>,
    #[serde(default)]
    pub transcripts: BTreeMap<String, TranscriptRecord>,
    #[serde(default)]
    pub notes: BTreeMap<String, MeetingNotes>,
}

impl BackupStore {
    pub fn meeting_count(&self) -> usize {
        self.meetings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meetings.is_empty()
    }

    pub fn meeting(&self, id: &str) -> Option<&MeetingRecord> {
        self.meetings.get(id)
    }

    pub fn transcript(&self, id: &str) -> Option<&TranscriptRecord> {
        self.transcripts.get(id)
    }

    pub fn notes(&self, id: &str) -> Option<&MeetingNotes> {
        self.notes.get(id)
    }
}

/// Bookkeeping stored alongside the merged data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// When the backup was first created; preserved across merges
    pub created_at: DateTime<Utc>,
    pub last_merged_at: DateTime<Utc>,
    pub source_path: String,
    pub meeting_count: usize,
    pub version: u32,
}

/// On-disk envelope for `backup.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    pub backup_metadata: BackupMetadata,
    #[serde(flatten)]
    pub store: BackupStore,
}

impl BackupFile {
    /// Wrap a freshly merged store, keeping the original creation time if known
    pub fn new(
        store: BackupStore,
        source_path: impl Into<String>,
        previous: Option<&BackupMetadata>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            backup_metadata: BackupMetadata {
                created_at: previous.map(|m| m.created_at).unwrap_or(now),
                last_merged_at: now,
                source_path: source_path.into(),
                meeting_count: store.meeting_count(),
                version: BACKUP_FORMAT_VERSION,
            },
            store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_backup_file_preserves_created_at() {
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let original = BackupFile::new(BackupStore::default(), "/cache.json", None, first);
        let next = BackupFile::new(
            BackupStore::default(),
            "/cache.json",
            Some(&original.backup_metadata),
            later,
        );

        assert_eq!(next.backup_metadata.created_at, first);
        assert_eq!(next.backup_metadata.last_merged_at, later);
        assert_eq!(next.backup_metadata.version, BACKUP_FORMAT_VERSION);
    }

    #[test]
    fn test_backup_file_json_layout() {
        let mut store = BackupStore::default();
        store
            .meetings
            .insert("m1".to_string(), MeetingRecord::new("m1"));
        let file = BackupFile::new(store, "/cache.json", None, Utc::now());

        let value = serde_json::to_value(&file).unwrap();
        assert!(value.get("backup_metadata").is_some());
        assert!(value["meetings"].get("m1").is_some());
        assert!(value.get("transcripts").is_some());
        assert_eq!(value["backup_metadata"]["meeting_count"], 1);

        let back: BackupFile = serde_json::from_value(value).unwrap();
        assert_eq!(back, file);
    }
}
